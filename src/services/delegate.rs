use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

/// Marker the external detector prints before its single-image JSON result.
const RESULT_MARKER: &str = "=== Result ===";
/// Marker printed before the JSON array in batch mode.
const BATCH_MARKER: &str = "=== Batch Results ===";

/// Result document emitted by the external detector.
#[derive(Debug, Clone, Deserialize)]
pub struct DelegateResult {
    /// Detectors report either `success` or `detected`; treat them the same.
    #[serde(default, alias = "detected")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl DelegateResult {
    fn generic_success() -> Self {
        Self {
            success: true,
            error: None,
            message: Some("face cropped successfully".to_string()),
            output_path: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    /// The detector process could not be started at all.
    #[error("failed to start detector process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The detector ran but reported failure (non-zero exit).
    #[error("detector process failed: {0}")]
    Execution(String),
}

/// Out-of-process detect-and-crop strategy.
///
/// Spawns an external detector binary, captures its stdout, and parses the
/// JSON document that follows a marker line. The runner only spawns,
/// captures and deserializes; callers stay agnostic to which detection
/// model runs behind the binary.
pub struct DelegateRunner {
    program: PathBuf,
}

impl DelegateRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Crop a single image: `<program> <input> -o <output> -p <padding>`.
    pub async fn crop_face(
        &self,
        input: &Path,
        output: &Path,
        padding: u32,
    ) -> Result<DelegateResult, DelegateError> {
        let output = self
            .run(&[
                input.as_os_str().to_os_string(),
                "-o".into(),
                output.as_os_str().to_os_string(),
                "-p".into(),
                padding.to_string().into(),
            ])
            .await?;

        if output.status.success() {
            // Exit 0 wins even when the marker or JSON is missing: the
            // detector reported success, so degrade to a generic result.
            let parsed = section_after(&output.stdout, RESULT_MARKER)
                .and_then(|json| serde_json::from_str::<DelegateResult>(json).ok());
            return Ok(parsed.unwrap_or_else(DelegateResult::generic_success));
        }

        Err(DelegateError::Execution(failure_reason(&output, RESULT_MARKER)))
    }

    /// Crop every image in a directory:
    /// `<program> <input_dir> --batch --output-dir <output_dir> -p <padding>`.
    pub async fn crop_face_batch(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        padding: u32,
    ) -> Result<Vec<DelegateResult>, DelegateError> {
        let output = self
            .run(&[
                input_dir.as_os_str().to_os_string(),
                "--batch".into(),
                "--output-dir".into(),
                output_dir.as_os_str().to_os_string(),
                "-p".into(),
                padding.to_string().into(),
            ])
            .await?;

        if output.status.success() {
            // Unparseable output with exit 0 resolves to an empty set.
            let parsed = section_after(&output.stdout, BATCH_MARKER)
                .and_then(|json| serde_json::from_str::<Vec<DelegateResult>>(json).ok());
            return Ok(parsed.unwrap_or_default());
        }

        Err(DelegateError::Execution(failure_reason(&output, BATCH_MARKER)))
    }

    async fn run(&self, args: &[std::ffi::OsString]) -> Result<CapturedOutput, DelegateError> {
        tracing::debug!(program = %self.program.display(), "Spawning external detector");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(DelegateError::Spawn)?;

        Ok(CapturedOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

struct CapturedOutput {
    status: std::process::ExitStatus,
    stdout: String,
    stderr: String,
}

/// Everything after the marker line, trimmed; None when the marker never
/// appeared.
fn section_after<'a>(stdout: &'a str, marker: &str) -> Option<&'a str> {
    stdout.split_once(marker).map(|(_, rest)| rest.trim())
}

/// Best error description for a non-zero exit: the detector's own JSON
/// `error` field, then stderr, then a generic message.
fn failure_reason(output: &CapturedOutput, marker: &str) -> String {
    if let Some(json) = section_after(&output.stdout, marker) {
        if let Ok(result) = serde_json::from_str::<DelegateResult>(json) {
            if let Some(error) = result.error {
                return error;
            }
        }
    }
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    "face crop process failed".to_string()
}
