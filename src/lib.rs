//! streamwatch
//!
//! Video stream ingestion, frame sampling and latest-frame publication for
//! object detection.
//!
//! # Architecture
//!
//! ```text
//! FrameSource -> StreamIngestion (decimates) -> DetectionStage (detect + annotate)
//!             -> LatestFramePublisher (replace) -> EventBus (notify)
//! ```
//!
//! `VideoProcessor` owns all of the above and drives start/stop/dispose. The
//! acquisition loop never runs detection itself: every `frame_interval`-th
//! frame is cloned and handed to a transient thread, and a sample that comes
//! due while a handoff is still running is dropped rather than queued.
//!
//! # Module Structure
//!
//! - `ingest`: capture backends (synthetic, GStreamer, V4L2) and `SourceId`
//! - `stream`: acquisition loop, decimation and stream state
//! - `detect`: detector trait, backends and registry
//! - `pipeline`: detection stage and overlay drawing
//! - `publish`: single-slot latest-frame publisher
//! - `events`: bounded observer channels
//! - `processor`: lifecycle controller
//! - `config`: file/env configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod processor;
pub mod publish;
pub mod stream;

pub use config::AppConfig;
pub use detect::{shared, BoundingBox, DetectionResult, Detector, DetectorRegistry, SharedDetector};
pub use error::{PipelineError, PipelineResult};
pub use events::{EventBus, PipelineEvent};
pub use frame::{Frame, Overlay};
pub use ingest::{CaptureSource, FrameSource, SourceId};
pub use pipeline::DetectionStage;
pub use processor::{ProcessorOptions, VideoProcessor};
pub use publish::LatestFramePublisher;
pub use stream::{Phase, StreamIngestion, StreamListener, StreamSnapshot, StreamState, Telemetry};
