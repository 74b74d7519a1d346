use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};

use crate::models::detection::{BoundingBox, CropOptions, DetectionResult};

/// JPEG quality of the final crop.
const OUTPUT_JPEG_QUALITY: u8 = 95;

/// Long-side ceiling for the detection pass. Larger images are downscaled
/// before detection and the box is rescaled afterwards.
const DETECT_MAX_DIM: u32 = 1024;

/// Candidate face rectangle in the coordinates of the frame handed to the
/// detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Pluggable face detection backend.
///
/// Implementations receive a grayscale frame (already downscaled for
/// performance) and return zero or more candidate rectangles. Candidate
/// order must be deterministic for a given frame; ties on area are broken
/// by first-encountered order.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, gray: &GrayImage) -> Vec<FaceRegion>;
}

/// Built-in detection backend: finds the largest connected region of
/// high local detail.
///
/// Portrait subjects carry far more texture than studio backdrops, so the
/// dominant high-variance component is a workable face proxy for the bulk
/// photo-crop flow. Deployments that need a real model point the pipeline
/// at the external delegate instead; both sit behind [`FaceDetector`].
pub struct BlockVarianceDetector {
    block_size: u32,
    /// A block is "detailed" when its variance exceeds the frame mean by
    /// this factor.
    variance_factor: f64,
    /// Components smaller than this many blocks are noise, not faces.
    min_blocks: usize,
}

impl Default for BlockVarianceDetector {
    fn default() -> Self {
        Self {
            block_size: 16,
            variance_factor: 1.0,
            min_blocks: 4,
        }
    }
}

impl BlockVarianceDetector {
    fn block_variances(&self, gray: &GrayImage) -> (Vec<f64>, u32, u32) {
        let bs = self.block_size;
        let bw = gray.width() / bs;
        let bh = gray.height() / bs;
        let mut variances = Vec::with_capacity((bw * bh) as usize);

        for by in 0..bh {
            for bx in 0..bw {
                let mut sum = 0u64;
                let mut sum_sq = 0u64;
                for dy in 0..bs {
                    for dx in 0..bs {
                        let v = gray.get_pixel(bx * bs + dx, by * bs + dy)[0] as u64;
                        sum += v;
                        sum_sq += v * v;
                    }
                }
                let n = (bs * bs) as f64;
                let mean = sum as f64 / n;
                variances.push(sum_sq as f64 / n - mean * mean);
            }
        }
        (variances, bw, bh)
    }
}

impl FaceDetector for BlockVarianceDetector {
    fn detect(&self, gray: &GrayImage) -> Vec<FaceRegion> {
        let (variances, bw, bh) = self.block_variances(gray);
        if variances.is_empty() {
            return Vec::new();
        }

        let mean = variances.iter().sum::<f64>() / variances.len() as f64;
        let threshold = mean * self.variance_factor;
        let detailed: Vec<bool> = variances.iter().map(|&v| v > threshold).collect();

        // Flood-fill connected detailed blocks (4-connectivity); each
        // component's block bounding box becomes one candidate.
        let mut visited = vec![false; detailed.len()];
        let mut candidates = Vec::new();

        for start in 0..detailed.len() {
            if visited[start] || !detailed[start] {
                continue;
            }
            let mut stack = vec![start];
            visited[start] = true;
            let (mut min_x, mut min_y) = (bw, bh);
            let (mut max_x, mut max_y) = (0u32, 0u32);
            let mut size = 0usize;

            while let Some(idx) = stack.pop() {
                size += 1;
                let x = idx as u32 % bw;
                let y = idx as u32 / bw;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                let mut push = |nx: i64, ny: i64| {
                    if nx >= 0 && ny >= 0 && (nx as u32) < bw && (ny as u32) < bh {
                        let nidx = (ny as u32 * bw + nx as u32) as usize;
                        if detailed[nidx] && !visited[nidx] {
                            visited[nidx] = true;
                            stack.push(nidx);
                        }
                    }
                };
                push(x as i64 - 1, y as i64);
                push(x as i64 + 1, y as i64);
                push(x as i64, y as i64 - 1);
                push(x as i64, y as i64 + 1);
            }

            if size >= self.min_blocks {
                candidates.push(FaceRegion {
                    x: min_x * self.block_size,
                    y: min_y * self.block_size,
                    width: (max_x - min_x + 1) * self.block_size,
                    height: (max_y - min_y + 1) * self.block_size,
                });
            }
        }

        candidates
    }
}

/// In-process detect-and-crop strategy.
///
/// Decodes the image, detects the most prominent face, pads and clamps the
/// box, extracts the region from the original-resolution image and produces
/// a square JPEG. Deterministic for a fixed detector; all failures convert
/// to a [`DetectionResult`] with `error` set rather than propagating.
pub struct FaceCropEngine {
    detector: Arc<dyn FaceDetector>,
}

impl FaceCropEngine {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    /// Produce a single best face crop for one image buffer.
    pub fn detect_and_crop(&self, image_bytes: &[u8], opts: &CropOptions) -> DetectionResult {
        if image_bytes.is_empty() {
            return DetectionResult::failure("empty image");
        }

        // Empty and undecodable buffers report the same way: there is no
        // image to work with.
        let original = match image::load_from_memory(image_bytes) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!(error = %e, "Image decode failed");
                return DetectionResult::failure("empty image");
            }
        };

        let (orig_w, orig_h) = (original.width(), original.height());
        if orig_w == 0 || orig_h == 0 {
            return DetectionResult::failure("empty image");
        }

        // Detection runs on a bounded-size frame; the chosen box is mapped
        // back to original coordinates below.
        let long_side = orig_w.max(orig_h);
        let (detect_frame, scale) = if long_side > DETECT_MAX_DIM {
            let scaled = original.resize(DETECT_MAX_DIM, DETECT_MAX_DIM, FilterType::Triangle);
            (scaled, long_side as f64 / DETECT_MAX_DIM as f64)
        } else {
            (original.clone(), 1.0)
        };

        let candidates = self.detector.detect(&detect_frame.to_luma8());
        let Some(best) = largest_region(&candidates) else {
            // No face is a valid negative outcome, not an error.
            return DetectionResult::not_detected();
        };

        let bbox = compute_geometry(best, scale, orig_w, orig_h, opts);

        match render_crop(&original, &bbox, opts) {
            Ok(cropped) => DetectionResult {
                detected: true,
                bbox: Some(bbox),
                cropped: Some(cropped),
                error: None,
            },
            Err(e) => DetectionResult::failure(format!("crop failed: {e}")),
        }
    }

    /// Apply [`Self::detect_and_crop`] to each buffer independently, in
    /// input order. One bad image never aborts the rest.
    pub fn detect_and_crop_batch(
        &self,
        images: &[Vec<u8>],
        opts: &CropOptions,
    ) -> Vec<DetectionResult> {
        images
            .iter()
            .map(|bytes| self.detect_and_crop(bytes, opts))
            .collect()
    }
}

/// Largest-area candidate; ties keep the first-encountered one.
fn largest_region(candidates: &[FaceRegion]) -> Option<FaceRegion> {
    candidates
        .iter()
        .copied()
        .reduce(|best, c| if c.area() > best.area() { c } else { best })
}

/// Map a detection-space box back to original coordinates and derive the
/// padded, bounds-clamped extraction rectangle.
fn compute_geometry(
    region: FaceRegion,
    scale: f64,
    orig_w: u32,
    orig_h: u32,
    opts: &CropOptions,
) -> BoundingBox {
    let rescale = |v: u32| (v as f64 * scale).round() as u32;

    // Rounding can land exactly on the far edge; pin the box inside the image.
    let x = rescale(region.x).min(orig_w.saturating_sub(1));
    let y = rescale(region.y).min(orig_h.saturating_sub(1));
    let width = rescale(region.width).max(1).min(orig_w - x);
    let height = rescale(region.height).max(1).min(orig_h - y);

    let pad_x = ((width as f64 * opts.padding_fraction).round() as u32).min(opts.max_padding_px);
    let pad_y = ((height as f64 * opts.padding_fraction).round() as u32).min(opts.max_padding_px);

    let extract_x = x.saturating_sub(pad_x);
    let extract_y = y.saturating_sub(pad_y);
    let extract_w = (width + pad_x * 2).min(orig_w - extract_x);
    let extract_h = (height + pad_y * 2).min(orig_h - extract_y);

    BoundingBox {
        x,
        y,
        width,
        height,
        pad_x,
        pad_y,
        extract_x,
        extract_y,
        extract_w,
        extract_h,
    }
}

/// Extract the rectangle from the full-resolution image, fit it onto a
/// square white canvas without distortion and encode as JPEG.
fn render_crop(
    original: &DynamicImage,
    bbox: &BoundingBox,
    opts: &CropOptions,
) -> Result<Vec<u8>, image::ImageError> {
    let size = opts.output_size.max(1);
    let region = original.crop_imm(bbox.extract_x, bbox.extract_y, bbox.extract_w, bbox.extract_h);
    let fitted = region.resize(size, size, FilterType::Lanczos3).to_rgb8();

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));
    let off_x = (size - fitted.width()) / 2;
    let off_y = (size - fitted.height()) / 2;
    image::imageops::overlay(&mut canvas, &fitted, off_x as i64, off_y as i64);

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), OUTPUT_JPEG_QUALITY);
    DynamicImage::ImageRgb8(canvas).write_with_encoder(encoder)?;
    Ok(buf)
}
