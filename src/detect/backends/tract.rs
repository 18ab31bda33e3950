#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Expects a single output shaped `[1, 4 + classes, candidates]` (or its
/// transpose) where the first four rows are `cx, cy, w, h` in model input
/// pixels and the remaining rows are per-class scores.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.25,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let resized = imageops::resize(frame.image(), self.width, self.height, FilterType::Triangle);
        tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        )
        .into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        let transposed = shape[1] > shape[2];
        let (rows, candidates) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if rows < 5 {
            return Err(anyhow!("detector output has {} rows, need at least 5", rows));
        }
        let at = |row: usize, candidate: usize| {
            if transposed {
                view[[0, candidate, row]]
            } else {
                view[[0, row, candidate]]
            }
        };

        let scale_x = frame.width() as f32 / self.width as f32;
        let scale_y = frame.height() as f32 / self.height as f32;
        let mut detections = Vec::new();
        for candidate in 0..candidates {
            let (class_id, score) = (4..rows)
                .map(|row| (row - 4, at(row, candidate)))
                .fold((0, f32::NEG_INFINITY), |best, next| {
                    if next.1 > best.1 {
                        next
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }
            detections.push(Detection {
                center_x: at(0, candidate) * scale_x,
                center_y: at(1, candidate) * scale_y,
                width: at(2, candidate) * scale_x,
                height: at(3, candidate) * scale_y,
                confidence: score,
                class_id: class_id as u32,
            });
        }
        Ok(suppress_overlaps(detections, self.iou_threshold))
    }
}

/// Greedy per-class non-maximum suppression, highest confidence first.
fn suppress_overlaps(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        let overlaps = kept.iter().any(|existing| {
            existing.class_id == detection.class_id && existing.iou(&detection) > iou_threshold
        });
        if !overlaps {
            kept.push(detection);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
