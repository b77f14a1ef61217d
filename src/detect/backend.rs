use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Implementations are not assumed to be reentrant. The pipeline shares a
/// detector as `SharedDetector`, so calls to one instance are serialised.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Boxes are in frame-pixel coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>>;

    /// Optional warm-up hook, run before streaming starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release model resources. Called once on dispose.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type SharedDetector = Arc<Mutex<dyn Detector>>;

/// Wrap a detector for use by the pipeline.
pub fn shared<D: Detector + 'static>(detector: D) -> SharedDetector {
    Arc::new(Mutex::new(detector))
}
