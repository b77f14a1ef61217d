use serde::{Deserialize, Serialize};

pub use crate::frame::BoundingBox;

/// One labelled box reported by a detector for a single frame.
///
/// Nothing links results across frames; there is no tracking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub name: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    /// Frame-pixel coordinates.
    pub bounds: BoundingBox,
}

impl DetectionResult {
    pub fn new(name: impl Into<String>, confidence: f32, bounds: BoundingBox) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bounds,
        }
    }

    /// Overlay label, e.g. `person (91%)`.
    pub fn label(&self) -> String {
        format!("{} ({:.0}%)", self.name, self.confidence * 100.0)
    }
}
