//! Lifecycle controller.
//!
//! `VideoProcessor` owns the frame source, the ingestion loop, the detection
//! stage and the publisher, and turns their results into events:
//!
//! - `Status` after every processed frame, and on start/stop
//! - `FrameUpdated` after every publication
//! - `Error` for open failures, read-circuit trips, detection failures and
//!   release failures
//!
//! Events are sent from background threads. Subscribers get a bounded queue
//! and must hop to their own thread themselves.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::detect::SharedDetector;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventBus, PipelineEvent, DEFAULT_EVENT_CAPACITY};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::pipeline::{annotate, DetectionStage};
use crate::publish::LatestFramePublisher;
use crate::stream::{
    IngestOptions, StreamIngestion, StreamListener, StreamSnapshot, StreamState,
    DEFAULT_EMPTY_READ_BACKOFF, DEFAULT_FRAME_INTERVAL, DEFAULT_STOP_GRACE,
};

pub const STATUS_STARTED: &str = "video processing started";
pub const STATUS_STOPPED: &str = "video processing stopped";

#[derive(Clone, Debug)]
pub struct ProcessorOptions {
    pub frame_interval: u64,
    pub stop_grace: Duration,
    /// `None` draws every detection.
    pub confidence_threshold: Option<f32>,
    /// TrueType/OpenType font for label and status text.
    pub font_path: Option<PathBuf>,
    pub event_capacity: usize,
    pub empty_read_backoff: Duration,
    pub max_consecutive_empty_reads: Option<u32>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            stop_grace: DEFAULT_STOP_GRACE,
            confidence_threshold: None,
            font_path: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            empty_read_backoff: DEFAULT_EMPTY_READ_BACKOFF,
            max_consecutive_empty_reads: None,
        }
    }
}

struct ProcessorInner {
    stage: DetectionStage,
    publisher: LatestFramePublisher,
    events: EventBus,
    state: Arc<StreamState>,
    /// Publisher epoch of the current session.
    session_epoch: AtomicU64,
}

impl StreamListener for ProcessorInner {
    fn on_frame(&self, mut frame: Frame) {
        let epoch = self.session_epoch.load(Ordering::SeqCst);
        let started = Instant::now();
        let telemetry = self.state.telemetry();

        if let Err(err) = self.stage.process(&mut frame, &telemetry) {
            self.events.error(err.to_string());
        }

        if !self.publisher.publish_in_epoch(epoch, frame) {
            log::debug!("VideoProcessor: discarding frame from a stopped session");
            return;
        }
        self.events.status(format!(
            "{} | Candidates In {} ms",
            annotate::status_line(&telemetry),
            started.elapsed().as_millis()
        ));
        self.events.frame_updated();
    }

    fn on_error(&self, error: PipelineError) {
        self.publisher.clear();
        self.events.error(error.to_string());
    }
}

/// Start/stop/dispose state machine over one frame source and one detector.
pub struct VideoProcessor {
    inner: Arc<ProcessorInner>,
    ingestion: StreamIngestion,
    control: Mutex<()>,
    disposed: AtomicBool,
}

impl VideoProcessor {
    /// Build a processor. Loads the font and warms the detector up front, so
    /// configuration problems surface here rather than once streaming.
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: SharedDetector,
        options: ProcessorOptions,
    ) -> PipelineResult<Self> {
        let ingestion = StreamIngestion::new(
            source,
            options.frame_interval,
            IngestOptions {
                stop_grace: options.stop_grace,
                empty_read_backoff: options.empty_read_backoff,
                max_consecutive_empty_reads: options.max_consecutive_empty_reads,
            },
        )?;

        let font = match &options.font_path {
            Some(path) => Some(
                annotate::load_font(path).map_err(|err| PipelineError::Config(format!("{err:#}")))?,
            ),
            None => None,
        };

        {
            let mut guard = detector
                .lock()
                .map_err(|_| PipelineError::Detection("detector lock poisoned".to_string()))?;
            guard
                .warm_up()
                .map_err(|err| PipelineError::Detection(format!("{err:#}")))?;
        }

        let stage = DetectionStage::new(detector)
            .with_threshold(options.confidence_threshold)
            .with_font(font);

        let inner = Arc::new(ProcessorInner {
            stage,
            publisher: LatestFramePublisher::new(),
            events: EventBus::new(options.event_capacity),
            state: Arc::clone(ingestion.state()),
            session_epoch: AtomicU64::new(0),
        });

        Ok(Self {
            inner,
            ingestion,
            control: Mutex::new(()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Subscribe to status, error and frame-updated events.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    /// Start processing `source_id` (device index, URL or path).
    ///
    /// No-op while already running or after `dispose`. Opening happens in the
    /// background; an unusable source is reported as an error event.
    pub fn start(&self, source_id: &str) {
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if self.disposed.load(Ordering::SeqCst) {
            log::warn!("VideoProcessor: start after dispose ignored");
            return;
        }
        if self.ingestion.state().is_running() {
            return;
        }

        self.inner
            .session_epoch
            .store(self.inner.publisher.epoch(), Ordering::SeqCst);
        let listener: Arc<dyn StreamListener> = Arc::clone(&self.inner) as Arc<dyn StreamListener>;
        if self.ingestion.start(source_id, listener) {
            self.inner.events.status(STATUS_STARTED);
        }
    }

    /// Stop processing. Safe to call any number of times, including before
    /// `start`; afterwards `peek()` is `None` and the read count is zero.
    pub fn stop(&self) {
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        self.stop_locked();
    }

    fn stop_locked(&self) {
        let was_running = self.ingestion.state().is_running();
        if let Err(err) = self.ingestion.stop() {
            self.inner.events.error(err.to_string());
        }
        self.inner.publisher.clear();
        if was_running {
            self.inner.events.status(STATUS_STOPPED);
        }
    }

    /// Stop, then release the frame source and the detector. Each release is
    /// attempted even if an earlier one failed; failures become error events.
    pub fn dispose(&self) {
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_locked();

        if let Err(err) = self.ingestion.source().release() {
            self.inner
                .events
                .error(PipelineError::release("frame source", &err).to_string());
        }

        match self.inner.stage.detector().lock() {
            Ok(mut detector) => {
                if let Err(err) = detector.release() {
                    self.inner
                        .events
                        .error(PipelineError::release("detector", &err).to_string());
                }
            }
            Err(_) => self.inner.events.error(
                PipelineError::ResourceRelease {
                    resource: "detector",
                    message: "detector lock poisoned".to_string(),
                }
                .to_string(),
            ),
        }

        self.inner.publisher.clear();
        log::info!("VideoProcessor: disposed");
    }

    pub fn is_running(&self) -> bool {
        self.ingestion.state().is_running()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Copy of the latest published frame.
    pub fn peek(&self) -> Option<Frame> {
        self.inner.publisher.peek()
    }

    pub fn publisher(&self) -> &LatestFramePublisher {
        &self.inner.publisher
    }

    pub fn frame_interval(&self) -> u64 {
        self.ingestion.state().frame_interval()
    }

    /// Takes effect from the next frame read.
    pub fn set_frame_interval(&self, interval: u64) -> PipelineResult<()> {
        self.ingestion.state().set_frame_interval(interval)
    }

    pub fn fps(&self) -> f64 {
        self.ingestion.state().fps()
    }

    pub fn read_frame_count(&self) -> u64 {
        self.ingestion.state().read_frame_count()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.ingestion.state().snapshot()
    }
}

impl Drop for VideoProcessor {
    fn drop(&mut self) {
        self.dispose();
    }
}
