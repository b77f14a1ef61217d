use anyhow::Result;

use crate::detect::backend::Detector;
use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Stub backend for testing and demos. Reports the same detections for
/// every frame.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    results: Vec<DetectionResult>,
}

impl StubBackend {
    pub fn new(results: Vec<DetectionResult>) -> Self {
        Self { results }
    }

    pub fn with_detection(mut self, result: DetectionResult) -> Self {
        self.results.push(result);
        self
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectionResult>> {
        Ok(self.results.clone())
    }
}
