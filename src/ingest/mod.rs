//! Frame ingestion sources.
//!
//! This module provides the capture backends behind `FrameSource`:
//! - Synthetic scenes (`stub://` URLs, tests and demos)
//! - Network streams and local files via GStreamer (feature: rtsp-gstreamer)
//! - Local cameras by device index via V4L2 (feature: ingest-v4l2)
//!
//! `CaptureSource` picks the backend when a source is opened. Backends keep
//! their own interior synchronisation so `release` can be called from a
//! different thread than the one blocked in `retrieve_frame`.

mod source_id;
pub mod synthetic;
#[cfg(feature = "rtsp-gstreamer")]
pub mod uri;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;

use crate::frame::Frame;

pub use source_id::SourceId;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "rtsp-gstreamer")]
pub use uri::UriSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Capture backend contract.
pub trait FrameSource: Send + Sync {
    /// Open the source. `Ok(false)` means the backend refused the source;
    /// `Err` means it failed while trying.
    fn open(&self, source: &SourceId) -> Result<bool>;

    /// Block until the next frame is available. `Ok(None)` (or an empty frame)
    /// means "nothing this time" and is skipped by the caller.
    fn retrieve_frame(&self) -> Result<Option<Frame>>;

    /// Current frame rate. May change once the source is actually streaming.
    fn fps(&self) -> f64;

    /// Release the capture resource. Idempotent, callable from any thread.
    fn release(&self) -> Result<()>;

    fn is_opened(&self) -> bool;
}

/// Default `FrameSource`: dispatches to a backend chosen per `open`.
#[derive(Default)]
pub struct CaptureSource {
    active: RwLock<Option<Arc<dyn FrameSource>>>,
}

impl CaptureSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Option<Arc<dyn FrameSource>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn backend_for(source: &SourceId) -> Result<Arc<dyn FrameSource>> {
        match source {
            SourceId::Url(url) if url.scheme() == "stub" => Ok(Arc::new(SyntheticSource::new(
                SyntheticConfig::from_url(url)?,
            ))),
            #[cfg(feature = "rtsp-gstreamer")]
            SourceId::Url(_) | SourceId::Path(_) => Ok(Arc::new(UriSource::new()?)),
            #[cfg(not(feature = "rtsp-gstreamer"))]
            SourceId::Url(_) | SourceId::Path(_) => {
                anyhow::bail!("{} requires the rtsp-gstreamer feature", source)
            }
            #[cfg(feature = "ingest-v4l2")]
            SourceId::Device(_) => Ok(Arc::new(V4l2Source::new())),
            #[cfg(not(feature = "ingest-v4l2"))]
            SourceId::Device(_) => {
                anyhow::bail!("{} requires the ingest-v4l2 feature", source)
            }
        }
    }
}

impl FrameSource for CaptureSource {
    fn open(&self, source: &SourceId) -> Result<bool> {
        self.release()?;
        let backend = Self::backend_for(source)?;
        if !backend.open(source)? {
            return Ok(false);
        }
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(backend);
        Ok(true)
    }

    fn retrieve_frame(&self) -> Result<Option<Frame>> {
        match self.current() {
            Some(backend) => backend.retrieve_frame(),
            None => Ok(None),
        }
    }

    fn fps(&self) -> f64 {
        self.current().map(|backend| backend.fps()).unwrap_or(0.0)
    }

    fn release(&self) -> Result<()> {
        let backend = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match backend {
            Some(backend) => backend.release(),
            None => Ok(()),
        }
    }

    fn is_opened(&self) -> bool {
        self.current().is_some_and(|backend| backend.is_opened())
    }
}
