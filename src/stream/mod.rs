//! Stream ingestion loop.
//!
//! `StreamIngestion::start` moves the stream Idle -> Opening and spawns a
//! background task that opens the source. On success the same task becomes the
//! acquisition loop (Streaming): it reads frames, counts the non-empty ones,
//! and every `frame_interval`-th frame hands a clone to the listener on a
//! transient thread. At most one handoff is in flight; a sample that comes due
//! while one is running is dropped so the next processed frame is the freshest
//! one available.
//!
//! `stop` signals cancellation, waits a bounded grace period, then releases the
//! capture resource whether or not the loop has noticed.

mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceId};

pub use state::{Phase, StreamSnapshot, StreamState, Telemetry, DEFAULT_FRAME_INTERVAL};

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(100);
pub const DEFAULT_EMPTY_READ_BACKOFF: Duration = Duration::from_millis(50);

/// Receives the output of the ingestion loop.
///
/// Both methods are called from background threads: `on_frame` from a
/// per-sample handoff thread, `on_error` from the ingestion task.
pub trait StreamListener: Send + Sync {
    fn on_frame(&self, frame: Frame);
    fn on_error(&self, error: PipelineError);
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// How long `stop` waits for the loop before forcing a release.
    pub stop_grace: Duration,
    /// Upper bound of the sleep between consecutive empty reads.
    pub empty_read_backoff: Duration,
    /// Stop with a `FrameRead` error after this many consecutive empty or
    /// failed reads. `None` retries forever.
    pub max_consecutive_empty_reads: Option<u32>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            stop_grace: DEFAULT_STOP_GRACE,
            empty_read_backoff: DEFAULT_EMPTY_READ_BACKOFF,
            max_consecutive_empty_reads: None,
        }
    }
}

struct RunHandle {
    cancel: Arc<AtomicBool>,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

pub struct StreamIngestion {
    source: Arc<dyn FrameSource>,
    state: Arc<StreamState>,
    options: IngestOptions,
    run: Mutex<Option<RunHandle>>,
}

impl StreamIngestion {
    pub fn new(
        source: Arc<dyn FrameSource>,
        frame_interval: u64,
        options: IngestOptions,
    ) -> PipelineResult<Self> {
        Ok(Self {
            source,
            state: Arc::new(StreamState::new(frame_interval)?),
            options,
            run: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &Arc<StreamState> {
        &self.state
    }

    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }

    /// Start streaming `source_id`. Returns false (and does nothing) unless
    /// the stream is Idle.
    pub fn start(&self, source_id: &str, listener: Arc<dyn StreamListener>) -> bool {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(generation) = self.state.begin_run(source_id) else {
            log::debug!("StreamIngestion: start ignored, stream is {:?}", self.state.phase());
            return false;
        };

        // A previous run that already finished on its own (open failure,
        // read circuit) still has a handle; reap it.
        if let Some(mut previous) = run.take() {
            if let Some(thread) = previous.thread.take() {
                if thread.is_finished() {
                    let _ = thread.join();
                }
            }
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let worker = IngestWorker {
            generation,
            raw_source: source_id.to_string(),
            source: Arc::clone(&self.source),
            state: Arc::clone(&self.state),
            options: self.options.clone(),
            cancel: Arc::clone(&cancel),
            in_flight: Arc::new(AtomicBool::new(false)),
            listener,
        };

        let spawned = thread::Builder::new()
            .name("stream-ingest".to_string())
            .spawn(move || {
                worker.run();
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(thread) => {
                *run = Some(RunHandle {
                    cancel,
                    done: done_rx,
                    thread: Some(thread),
                });
                true
            }
            Err(err) => {
                log::error!("StreamIngestion: failed to spawn ingestion task: {}", err);
                self.state.finish_run(generation);
                false
            }
        }
    }

    /// Stop streaming. Idempotent; always leaves the stream Idle with a zero
    /// read count. Returns an error only if forcing the release failed.
    pub fn stop(&self) -> PipelineResult<()> {
        let handle = self
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(mut handle) = handle else {
            self.state.retire();
            return Ok(());
        };

        handle.cancel.store(true, Ordering::SeqCst);
        if self.state.is_running() {
            log::info!("StreamIngestion: stopping");
        }

        match handle.done.recv_timeout(self.options.stop_grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = handle.thread.take() {
                    let _ = thread.join();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "StreamIngestion: loop did not stop within {:?}, forcing release",
                    self.options.stop_grace
                );
            }
        }

        self.state.retire();
        self.source
            .release()
            .map_err(|err| PipelineError::release("frame source", &err))
    }
}

impl Drop for StreamIngestion {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("StreamIngestion: {}", err);
        }
    }
}

/// Shuts the run down and reports it if the ingestion task panics.
struct UnwindGuard<'a>(&'a IngestWorker);

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.recover_from_panic();
        }
    }
}

/// Clears the in-flight flag when a handoff finishes, even by panic.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct IngestWorker {
    generation: u64,
    raw_source: String,
    source: Arc<dyn FrameSource>,
    state: Arc<StreamState>,
    options: IngestOptions,
    cancel: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    listener: Arc<dyn StreamListener>,
}

impl IngestWorker {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn run(&self) {
        let _unwind = UnwindGuard(self);

        if let Err(err) = self.open() {
            if self.state.is_current(self.generation) {
                if let Err(release) = self.source.release() {
                    log::warn!("StreamIngestion: release failed: {:#}", release);
                }
                // Still Opening: no new run can start before the listener
                // has seen the error.
                self.listener.on_error(err);
                self.state.finish_run(self.generation);
            } else {
                self.release_if_abandoned();
            }
            return;
        }

        if self.cancelled()
            || !self
                .state
                .transition(self.generation, Phase::Opening, Phase::Streaming)
        {
            self.shutdown();
            return;
        }
        log::info!("StreamIngestion: streaming {}", self.raw_source);

        if let Some(err) = self.acquire() {
            self.listener.on_error(err);
        }
        self.shutdown();
    }

    /// Called while unwinding out of `run`.
    fn recover_from_panic(&self) {
        log::error!("StreamIngestion: ingestion task for {} panicked", self.raw_source);
        if self.state.is_current(self.generation) {
            self.listener.on_error(PipelineError::FrameRead(format!(
                "ingestion task for {} panicked",
                self.raw_source
            )));
        }
        self.shutdown();
    }

    /// A run retired by `stop` while its open was still in flight can come
    /// back holding a freshly opened source. Release it unless a newer run
    /// has begun and owns the source now.
    fn release_if_abandoned(&self) {
        let released = self.state.release_abandoned(self.generation, || {
            if let Err(err) = self.source.release() {
                log::warn!("StreamIngestion: release failed: {:#}", err);
            }
        });
        if released {
            log::debug!("StreamIngestion: released source of retired run {}", self.raw_source);
        }
    }

    fn open(&self) -> PipelineResult<()> {
        let id = SourceId::parse(&self.raw_source)?;
        match self.source.open(&id) {
            Ok(true) => Ok(()),
            Ok(false) => Err(PipelineError::SourceUnavailable(self.raw_source.clone())),
            Err(err) => Err(PipelineError::SourceOpen {
                source_id: self.raw_source.clone(),
                message: format!("{err:#}"),
            }),
        }
    }

    /// Acquisition loop. Returns the error that stopped it, if any.
    fn acquire(&self) -> Option<PipelineError> {
        let mut consecutive_empty: u32 = 0;

        while !self.cancelled() {
            let read = self.source.retrieve_frame();
            if self.cancelled() {
                break;
            }
            self.state.set_fps(self.source.fps());

            let frame = match read {
                Ok(Some(frame)) if !frame.is_empty() => frame,
                Ok(_) => {
                    log::trace!("StreamIngestion: empty frame, skipping");
                    consecutive_empty = consecutive_empty.saturating_add(1);
                    if let Some(err) = self.check_read_circuit(consecutive_empty, None) {
                        return Some(err);
                    }
                    self.backoff(consecutive_empty);
                    continue;
                }
                Err(err) => {
                    log::debug!("StreamIngestion: frame read failed: {:#}", err);
                    consecutive_empty = consecutive_empty.saturating_add(1);
                    if let Some(err) = self.check_read_circuit(consecutive_empty, Some(&err)) {
                        return Some(err);
                    }
                    self.backoff(consecutive_empty);
                    continue;
                }
            };
            consecutive_empty = 0;

            let count = self.state.record_read();
            if self.state.is_sample_due(count) {
                self.hand_off(&frame, count);
            }
        }
        None
    }

    fn check_read_circuit(
        &self,
        consecutive: u32,
        last_error: Option<&anyhow::Error>,
    ) -> Option<PipelineError> {
        let limit = self.options.max_consecutive_empty_reads?;
        if consecutive < limit {
            return None;
        }
        let detail = match last_error {
            Some(err) => format!(": {err:#}"),
            None => String::new(),
        };
        Some(PipelineError::FrameRead(format!(
            "no frames from {} after {} attempts{}",
            self.raw_source, consecutive, detail
        )))
    }

    fn backoff(&self, consecutive: u32) {
        if self.options.empty_read_backoff.is_zero() {
            return;
        }
        let exponent = consecutive.saturating_sub(1).min(16);
        let delay = Duration::from_millis(1u64 << exponent).min(self.options.empty_read_backoff);
        thread::sleep(delay);
    }

    fn hand_off(&self, frame: &Frame, count: u64) {
        self.state.record_handoff_attempt();

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::trace!("StreamIngestion: handoff busy, dropping sample {}", count);
            self.state.record_dropped_sample();
            return;
        }
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        // The backend may reuse its buffer; the handoff gets its own copy.
        let mut sample = frame.clone();
        sample.set_sequence(count);
        let listener = Arc::clone(&self.listener);

        let spawned = thread::Builder::new()
            .name("frame-handoff".to_string())
            .spawn(move || {
                let _guard = guard;
                listener.on_frame(sample);
            });
        if let Err(err) = spawned {
            log::warn!("StreamIngestion: failed to spawn handoff: {}", err);
            self.state.record_dropped_sample();
        }
    }

    fn shutdown(&self) {
        if !self
            .state
            .transition(self.generation, Phase::Streaming, Phase::Stopping)
        {
            self.state
                .transition(self.generation, Phase::Opening, Phase::Stopping);
        }
        if !self.state.is_current(self.generation) {
            self.release_if_abandoned();
            return;
        }
        if let Err(err) = self.source.release() {
            log::warn!("StreamIngestion: release failed: {:#}", err);
        }
        self.state.finish_run(self.generation);
        log::info!("StreamIngestion: stopped {}", self.raw_source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<u64>>,
        errors: Mutex<Vec<PipelineError>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StreamListener for Recorder {
        fn on_frame(&self, frame: Frame) {
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            self.frames.lock().unwrap().push(frame.sequence());
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, error: PipelineError) {
            self.errors.lock().unwrap().push(error);
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn synthetic(frames: u64) -> Arc<dyn FrameSource> {
        Arc::new(SyntheticSource::new(SyntheticConfig {
            width: 16,
            height: 12,
            fps: 0.0,
            frame_limit: Some(frames),
        }))
    }

    fn fast_options() -> IngestOptions {
        IngestOptions {
            stop_grace: Duration::from_millis(200),
            empty_read_backoff: Duration::from_millis(2),
            max_consecutive_empty_reads: None,
        }
    }

    #[test]
    fn handoffs_follow_frame_interval() {
        let ingestion = StreamIngestion::new(synthetic(20), 3, fast_options()).unwrap();
        let recorder = Arc::new(Recorder::default());

        assert!(ingestion.start("stub://cam", recorder.clone()));
        assert!(wait_until(Duration::from_secs(5), || {
            ingestion.state().read_frame_count() == 20
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            recorder.calls.load(Ordering::SeqCst) as u64
                == ingestion.state().handoffs_attempted() - ingestion.state().samples_dropped()
        }));

        assert_eq!(ingestion.state().handoffs_attempted(), 6);
        let frames = recorder.frames.lock().unwrap().clone();
        assert!(frames.iter().all(|seq| seq % 3 == 0));
        assert!(frames.windows(2).all(|w| w[0] < w[1]), "capture order kept");

        ingestion.stop().unwrap();
        assert_eq!(ingestion.state().read_frame_count(), 0);
        assert_eq!(ingestion.state().phase(), Phase::Idle);
    }

    #[test]
    fn busy_handoff_drops_new_samples() {
        let ingestion = StreamIngestion::new(synthetic(10), 1, fast_options()).unwrap();
        let recorder = Arc::new(Recorder {
            delay: Some(Duration::from_millis(300)),
            ..Recorder::default()
        });

        ingestion.start("stub://cam", recorder.clone());
        assert!(wait_until(Duration::from_secs(5), || {
            ingestion.state().read_frame_count() == 10
        }));

        let state = ingestion.state();
        assert_eq!(state.handoffs_attempted(), 10);
        assert!(state.samples_dropped() >= 1);
        assert!(recorder.calls.load(Ordering::SeqCst) < 10);
        ingestion.stop().unwrap();
    }

    #[test]
    fn start_is_ignored_while_running() {
        let ingestion = StreamIngestion::new(synthetic(1), 1, fast_options()).unwrap();
        let recorder = Arc::new(Recorder::default());

        assert!(ingestion.start("stub://cam", recorder.clone()));
        assert!(!ingestion.start("stub://other", recorder.clone()));
        assert_eq!(ingestion.state().source().as_deref(), Some("stub://cam"));
        ingestion.stop().unwrap();
    }

    #[test]
    fn malformed_source_reports_one_error_and_returns_idle() {
        let ingestion = StreamIngestion::new(synthetic(1), 1, fast_options()).unwrap();
        let recorder = Arc::new(Recorder::default());

        ingestion.start("rtsp://[::1", recorder.clone());
        assert!(wait_until(Duration::from_secs(5), || {
            ingestion.state().phase() == Phase::Idle
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            !recorder.errors.lock().unwrap().is_empty()
        }));

        let errors = recorder.errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PipelineError::InvalidSource { .. }));
        assert!(!ingestion.state().is_running());
    }

    #[test]
    fn read_circuit_trips_when_configured() {
        let options = IngestOptions {
            max_consecutive_empty_reads: Some(5),
            ..fast_options()
        };
        let ingestion = StreamIngestion::new(synthetic(2), 1, options).unwrap();
        let recorder = Arc::new(Recorder::default());

        ingestion.start("stub://cam", recorder.clone());
        assert!(wait_until(Duration::from_secs(5), || {
            !recorder.errors.lock().unwrap().is_empty()
        }));

        let errors = recorder.errors.lock().unwrap().clone();
        assert!(matches!(errors[0], PipelineError::FrameRead(_)));
        assert!(wait_until(Duration::from_secs(5), || {
            ingestion.state().phase() == Phase::Idle
        }));
        assert!(!ingestion.source().is_opened());
    }

    #[test]
    fn stop_is_idempotent_and_safe_before_start() {
        let ingestion = StreamIngestion::new(synthetic(1), 1, fast_options()).unwrap();
        ingestion.stop().unwrap();
        ingestion.stop().unwrap();
        assert_eq!(ingestion.state().phase(), Phase::Idle);
        assert_eq!(ingestion.state().read_frame_count(), 0);
    }

    /// Source whose `open` and `retrieve_frame` block for a fixed time and
    /// ignore cancellation.
    struct StallingSource {
        open_delay: Duration,
        read_delay: Duration,
        opened: AtomicBool,
        opens: AtomicUsize,
        releases: AtomicUsize,
    }

    impl StallingSource {
        fn new(open_delay: Duration, read_delay: Duration) -> Self {
            Self {
                open_delay,
                read_delay,
                opened: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
            }
        }
    }

    impl FrameSource for StallingSource {
        fn open(&self, _source: &SourceId) -> anyhow::Result<bool> {
            thread::sleep(self.open_delay);
            self.opened.store(true, Ordering::SeqCst);
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn retrieve_frame(&self) -> anyhow::Result<Option<Frame>> {
            thread::sleep(self.read_delay);
            if !self.opened.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(Some(Frame::filled(8, 8, [1, 2, 3])))
        }

        fn fps(&self) -> f64 {
            0.0
        }

        fn release(&self) -> anyhow::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.opened.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_opened(&self) -> bool {
            self.opened.load(Ordering::SeqCst)
        }
    }

    struct PanickingSource;

    impl FrameSource for PanickingSource {
        fn open(&self, _source: &SourceId) -> anyhow::Result<bool> {
            Ok(true)
        }

        fn retrieve_frame(&self) -> anyhow::Result<Option<Frame>> {
            panic!("capture backend bug");
        }

        fn fps(&self) -> f64 {
            0.0
        }

        fn release(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn is_opened(&self) -> bool {
            false
        }
    }

    fn short_grace() -> IngestOptions {
        IngestOptions {
            stop_grace: Duration::from_millis(50),
            ..fast_options()
        }
    }

    #[test]
    fn stop_forces_release_when_read_blocks() {
        let source = Arc::new(StallingSource::new(Duration::ZERO, Duration::from_secs(1)));
        let ingestion = StreamIngestion::new(source.clone(), 1, short_grace()).unwrap();
        let recorder = Arc::new(Recorder::default());

        assert!(ingestion.start("stub://cam", recorder.clone()));
        assert!(wait_until(Duration::from_secs(2), || {
            ingestion.state().phase() == Phase::Streaming
        }));
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        ingestion.stop().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500), "stop is bounded");
        assert!(source.releases.load(Ordering::SeqCst) >= 1);
        assert!(!source.is_opened());
        assert_eq!(ingestion.state().phase(), Phase::Idle);
        assert_eq!(ingestion.state().read_frame_count(), 0);

        // The stale loop wakes up later; it must not release the new run.
        assert!(ingestion.start("stub://cam", recorder.clone()));
        assert!(wait_until(Duration::from_secs(5), || {
            ingestion.state().read_frame_count() >= 2
        }));
        assert!(source.is_opened());
        ingestion.stop().unwrap();
    }

    #[test]
    fn stop_during_slow_open_leaves_source_released() {
        let source = Arc::new(StallingSource::new(
            Duration::from_millis(300),
            Duration::from_millis(5),
        ));
        let ingestion = StreamIngestion::new(source.clone(), 1, short_grace()).unwrap();
        let recorder = Arc::new(Recorder::default());

        assert!(ingestion.start("stub://cam", recorder.clone()));
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        ingestion.stop().unwrap();
        assert!(started.elapsed() < Duration::from_millis(250), "stop is bounded");
        assert_eq!(ingestion.state().phase(), Phase::Idle);

        assert!(wait_until(Duration::from_secs(2), || {
            source.opens.load(Ordering::SeqCst) == 1
        }));
        assert!(wait_until(Duration::from_secs(2), || !source.is_opened()));
        assert_eq!(ingestion.state().phase(), Phase::Idle);
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_backend_reports_error_and_returns_idle() {
        let ingestion =
            StreamIngestion::new(Arc::new(PanickingSource), 1, fast_options()).unwrap();
        let recorder = Arc::new(Recorder::default());

        assert!(ingestion.start("stub://cam", recorder.clone()));
        assert!(wait_until(Duration::from_secs(5), || {
            ingestion.state().phase() == Phase::Idle
        }));
        let errors = recorder.errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PipelineError::FrameRead(_)));
        assert!(!ingestion.state().is_running());

        assert!(ingestion.start("stub://cam", recorder.clone()), "restart allowed");
        ingestion.stop().unwrap();
    }

    /// Records the stream phase seen from inside `on_error`.
    #[derive(Default)]
    struct PhaseRecorder {
        state: Mutex<Option<Arc<StreamState>>>,
        phases: Mutex<Vec<Phase>>,
    }

    impl StreamListener for PhaseRecorder {
        fn on_frame(&self, _frame: Frame) {}

        fn on_error(&self, _error: PipelineError) {
            if let Some(state) = self.state.lock().unwrap().as_ref() {
                self.phases.lock().unwrap().push(state.phase());
            }
        }
    }

    #[test]
    fn errors_are_reported_before_the_stream_goes_idle() {
        let options = IngestOptions {
            max_consecutive_empty_reads: Some(3),
            ..fast_options()
        };
        for (raw, frames) in [("rtsp://[::1", 1), ("stub://cam", 1)] {
            let ingestion = StreamIngestion::new(synthetic(frames), 1, options.clone()).unwrap();
            let recorder = Arc::new(PhaseRecorder::default());
            *recorder.state.lock().unwrap() = Some(Arc::clone(ingestion.state()));

            ingestion.start(raw, recorder.clone());
            assert!(wait_until(Duration::from_secs(5), || {
                !recorder.phases.lock().unwrap().is_empty()
            }));
            let phases = recorder.phases.lock().unwrap().clone();
            assert_ne!(phases[0], Phase::Idle, "{raw}");
            assert!(wait_until(Duration::from_secs(5), || {
                ingestion.state().phase() == Phase::Idle
            }));
        }
    }
}
