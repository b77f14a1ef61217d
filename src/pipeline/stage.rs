use ab_glyph::FontArc;

use super::annotate;
use crate::detect::{DetectionResult, SharedDetector};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;
use crate::stream::Telemetry;

/// Runs the detector on a handed-off frame and annotates it in place.
pub struct DetectionStage {
    detector: SharedDetector,
    threshold: Option<f32>,
    font: Option<FontArc>,
}

impl DetectionStage {
    pub fn new(detector: SharedDetector) -> Self {
        Self {
            detector,
            threshold: None,
            font: None,
        }
    }

    /// Only results with confidence strictly above `threshold` are drawn.
    /// `None` draws everything.
    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    pub fn detector(&self) -> &SharedDetector {
        &self.detector
    }

    /// Detect and annotate. Returns the results that were drawn.
    ///
    /// On a detector failure the frame is left untouched and the error is
    /// returned as `PipelineError::Detection`; the caller decides what to do
    /// with the bare frame.
    pub fn process(
        &self,
        frame: &mut Frame,
        telemetry: &Telemetry,
    ) -> PipelineResult<Vec<DetectionResult>> {
        let results = {
            let mut detector = self.detector.lock().map_err(|_| {
                PipelineError::Detection("detector lock poisoned".to_string())
            })?;
            detector
                .detect(frame)
                .map_err(|err| PipelineError::Detection(format!("{err:#}")))?
        };

        let results: Vec<DetectionResult> = match self.threshold {
            Some(threshold) => results
                .into_iter()
                .filter(|r| r.confidence > threshold)
                .collect(),
            None => results,
        };

        let font = self.font.as_ref();
        for result in &results {
            annotate::draw_detection(frame, result, font);
        }
        annotate::draw_status(frame, telemetry, font);
        Ok(results)
    }
}
