use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Maximum number of jobs in the active state at once.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Fallback cadence of the dispatch loop, in milliseconds.
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,

    /// Directory processed photos are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Path to the external detector binary; enables background-removal
    /// jobs when set.
    #[serde(default)]
    pub delegate_bin: Option<String>,

    /// Padding (pixels) passed to the external detector.
    #[serde(default = "default_delegate_padding")]
    pub delegate_padding: u32,

    /// Proportion of the detected face added as crop margin per side.
    #[serde(default = "default_padding_fraction")]
    pub padding_fraction: f64,

    /// Ceiling on the crop margin, in pixels.
    #[serde(default = "default_max_padding_px")]
    pub max_padding_px: u32,

    /// Side length of the square crop output.
    #[serde(default = "default_output_size")]
    pub output_size: u32,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_concurrency_limit() -> usize {
    3
}

fn default_dispatch_interval_ms() -> u64 {
    100
}

fn default_output_dir() -> String {
    "processed".to_string()
}

fn default_delegate_padding() -> u32 {
    20
}

fn default_padding_fraction() -> f64 {
    0.15
}

fn default_max_padding_px() -> u32 {
    50
}

fn default_output_size() -> u32 {
    300
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn crop_options(&self) -> crate::models::detection::CropOptions {
        crate::models::detection::CropOptions {
            padding_fraction: self.padding_fraction,
            max_padding_px: self.max_padding_px,
            output_size: self.output_size,
        }
    }
}
