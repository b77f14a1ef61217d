mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{shared, Detector, SharedDetector};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{MotionBackend, StubBackend};
pub use registry::DetectorRegistry;
pub use result::{BoundingBox, DetectionResult};
