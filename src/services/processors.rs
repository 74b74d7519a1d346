use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use crate::models::detection::CropOptions;
use crate::models::job::Job;
use crate::services::delegate::DelegateRunner;
use crate::services::face_crop::FaceCropEngine;
use crate::services::scheduler::{JobContext, ProcessError, Processor};

/// Processor for `face-crop` jobs using the in-process engine.
///
/// Reads the source photo, runs detection and crop on a blocking thread,
/// writes the JPEG under the output directory and returns the geometry in
/// the job result. A photo with no detectable face completes successfully
/// with `detected: false`; decode and crop errors fail the job.
pub struct FaceCropProcessor {
    engine: Arc<FaceCropEngine>,
    crop_options: CropOptions,
    output_dir: PathBuf,
}

impl FaceCropProcessor {
    pub fn new(engine: Arc<FaceCropEngine>, crop_options: CropOptions, output_dir: PathBuf) -> Self {
        Self {
            engine,
            crop_options,
            output_dir,
        }
    }
}

#[async_trait]
impl Processor for FaceCropProcessor {
    async fn process(&self, job: &Job, ctx: &JobContext) -> Result<serde_json::Value, ProcessError> {
        let photo_path = Path::new(&job.payload.photo_path);
        tracing::debug!(job_id = %job.id, path = %photo_path.display(), "Reading source photo");

        let bytes = tokio::fs::read(photo_path)
            .await
            .map_err(|e| ProcessError(format!("failed to read '{}': {e}", photo_path.display())))?;
        ctx.set_progress(25);

        let engine = Arc::clone(&self.engine);
        let opts = self.crop_options;
        let result = tokio::task::spawn_blocking(move || engine.detect_and_crop(&bytes, &opts))
            .await
            .map_err(|e| ProcessError(format!("crop task panicked: {e}")))?;
        ctx.set_progress(60);

        if let Some(error) = result.error {
            return Err(ProcessError(error));
        }

        if !result.detected {
            // A legitimate negative outcome: the job succeeds, the caller
            // sees there was nothing to crop.
            tracing::info!(job_id = %job.id, record_id = %job.payload.record_id, "No face detected");
            return Ok(serde_json::json!({
                "record_id": job.payload.record_id,
                "detected": false,
            }));
        }

        let cropped = result.cropped.expect("detected result carries crop bytes");
        let output_path = self
            .output_dir
            .join(format!("{}_face.jpg", job.payload.record_id));

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ProcessError(format!("failed to create output dir: {e}")))?;
        tokio::fs::write(&output_path, &cropped)
            .await
            .map_err(|e| ProcessError(format!("failed to write '{}': {e}", output_path.display())))?;
        ctx.set_progress(90);

        tracing::info!(
            job_id = %job.id,
            record_id = %job.payload.record_id,
            output = %output_path.display(),
            bytes = cropped.len(),
            "Face crop written"
        );

        Ok(serde_json::json!({
            "record_id": job.payload.record_id,
            "detected": true,
            "bbox": result.bbox,
            "output_path": output_path.to_string_lossy(),
            "cropped_base64": base64::engine::general_purpose::STANDARD.encode(&cropped),
        }))
    }
}

/// Processor for `background-removal` jobs, delegating to the external
/// detector binary.
pub struct BackgroundRemovalProcessor {
    delegate: Arc<DelegateRunner>,
    output_dir: PathBuf,
    padding: u32,
}

impl BackgroundRemovalProcessor {
    pub fn new(delegate: Arc<DelegateRunner>, output_dir: PathBuf, padding: u32) -> Self {
        Self {
            delegate,
            output_dir,
            padding,
        }
    }
}

#[async_trait]
impl Processor for BackgroundRemovalProcessor {
    async fn process(&self, job: &Job, ctx: &JobContext) -> Result<serde_json::Value, ProcessError> {
        let input = Path::new(&job.payload.photo_path);
        let output = self
            .output_dir
            .join(format!("{}_nobg.png", job.payload.record_id));

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ProcessError(format!("failed to create output dir: {e}")))?;
        ctx.set_progress(10);

        let result = self
            .delegate
            .crop_face(input, &output, self.padding)
            .await
            .map_err(|e| ProcessError(e.to_string()))?;
        ctx.set_progress(90);

        if !result.success {
            return Err(ProcessError(
                result
                    .error
                    .unwrap_or_else(|| "background removal failed".to_string()),
            ));
        }

        tracing::info!(
            job_id = %job.id,
            record_id = %job.payload.record_id,
            output = %output.display(),
            "Background removal finished"
        );

        Ok(serde_json::json!({
            "record_id": job.payload.record_id,
            "output_path": result
                .output_path
                .unwrap_or_else(|| output.to_string_lossy().into_owned()),
            "message": result.message,
        }))
    }
}
