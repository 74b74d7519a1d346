use serde::{Deserialize, Serialize};

/// Face bounding box in original-image pixel coordinates, plus the padding
/// and extraction geometry derived from it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub extract_x: u32,
    pub extract_y: u32,
    pub extract_w: u32,
    pub extract_h: u32,
}

/// Outcome of one detect-and-crop invocation. Transient: owned by the
/// caller, never persisted.
///
/// Three shapes are possible:
/// - detected: `detected == true`, `bbox` and `cropped` set, `error` unset
/// - no face found: everything unset — a valid negative outcome
/// - error (decode/processing): `detected == false` with `error` set
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionResult {
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    /// Encoded JPEG of the final crop.
    #[serde(skip)]
    pub cropped: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn not_detected() -> Self {
        Self::default()
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// True when detection failed for a reason, as opposed to a legitimate
    /// absence of a face.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Tunables for the crop geometry.
#[derive(Debug, Clone, Copy)]
pub struct CropOptions {
    /// Proportion of the face box added as margin on each side.
    pub padding_fraction: f64,
    /// Hard ceiling on the padding, in pixels, per axis.
    pub max_padding_px: u32,
    /// Side length of the square output image.
    pub output_size: u32,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            padding_fraction: 0.15,
            max_padding_px: 50,
            output_size: 300,
        }
    }
}
