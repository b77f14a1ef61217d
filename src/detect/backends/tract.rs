#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, DetectionResult};
use crate::error::PipelineError;
use crate::frame::Frame;

const NMS_IOU: f32 = 0.45;

/// Tract-based backend for YOLO-style ONNX detection models.
///
/// Expects a single `[1, 3, S, S]` float input and a `[1, 4 + C, N]` output of
/// `(cx, cy, w, h, class scores...)` rows in model-input pixels. Frames are
/// resized to the model input and boxes are scaled back to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// Fails with `PipelineError::ModelNotFound` before touching tract if the
    /// file does not exist.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(PipelineError::ModelNotFound(model_path.to_path_buf()).into());
        }
        if input_size == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );
        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            labels: Vec::new(),
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Class names, one per line, in model output order.
    pub fn with_labels_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels from {}", path.display()))?;
        self.labels = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(self)
    }

    fn class_name(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| format!("class{class}"))
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.input_size;
        let resized = imageops::resize(frame.image(), side, side, FilterType::Triangle);
        let side = side as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            f32::from(resized.get_pixel(x as u32, y as u32).0[channel]) / 255.0
        })
        .into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<DetectionResult>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|_| anyhow!("expected a rank-3 model output"))?;
        let (batch, rows, anchors) = view.dim();
        if batch != 1 || rows <= 4 {
            return Err(anyhow!(
                "unexpected model output shape [{}, {}, {}]",
                batch,
                rows,
                anchors
            ));
        }
        let scale_x = frame.width() as f32 / self.input_size as f32;
        let scale_y = frame.height() as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class, score) = (4..rows)
                .map(|row| (row - 4, view[[0, row, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, item| {
                    if item.1 > best.1 {
                        item
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }
            let (cx, cy) = (view[[0, 0, anchor]], view[[0, 1, anchor]]);
            let (w, h) = (view[[0, 2, anchor]], view[[0, 3, anchor]]);
            let Some(bounds) = clip_to_frame(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
                frame,
            ) else {
                continue;
            };
            candidates.push((class, DetectionResult::new(self.class_name(class), score, bounds)));
        }

        Ok(non_max_suppression(candidates))
    }
}

/// Clamp corner coordinates to the frame. Boxes with nothing left inside
/// the frame are discarded.
fn clip_to_frame(x0: f32, y0: f32, x1: f32, y1: f32, frame: &Frame) -> Option<BoundingBox> {
    let (fw, fh) = (frame.width() as f32, frame.height() as f32);
    let (x0, x1) = (x0.clamp(0.0, fw), x1.clamp(0.0, fw));
    let (y0, y1) = (y0.clamp(0.0, fh), y1.clamp(0.0, fh));
    if !(x1 > x0 && y1 > y0) {
        return None;
    }
    Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
}

/// Greedy per-class NMS, highest confidence first.
fn non_max_suppression(mut candidates: Vec<(usize, DetectionResult)>) -> Vec<DetectionResult> {
    candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));
    let mut kept: Vec<(usize, DetectionResult)> = Vec::new();
    for (class, candidate) in candidates {
        let suppressed = kept
            .iter()
            .any(|(k, r)| *k == class && r.bounds.iou(&candidate.bounds) > NMS_IOU);
        if !suppressed {
            kept.push((class, candidate));
        }
    }
    kept.into_iter().map(|(_, result)| result).collect()
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
