use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_FRAME_INTERVAL: u64 = 5;

/// Ingestion lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Opening,
    Streaming,
    Stopping,
}

struct Lifecycle {
    phase: Phase,
    /// Identifies the current run. Bumped on every start and stop so a loop
    /// that outlives its run cannot touch shared state.
    generation: u64,
    /// Generation handed out by the most recent `begin_run`.
    latest_run: u64,
    source: Option<String>,
}

/// Values the annotation stage reads when drawing the status line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Telemetry {
    pub fps: f64,
    pub read_frame_count: u64,
    pub frame_interval: u64,
}

impl Telemetry {
    pub fn processed_frames(&self) -> u64 {
        self.read_frame_count / self.frame_interval.max(1)
    }
}

/// Point-in-time view of the stream, for observers and logs.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamSnapshot {
    pub source: Option<String>,
    pub phase: Phase,
    pub is_running: bool,
    pub read_frame_count: u64,
    pub frame_interval: u64,
    pub fps: f64,
    pub handoffs_attempted: u64,
    pub samples_dropped: u64,
}

/// Shared stream state.
///
/// Counters are written by the acquisition loop and read by any thread; reads
/// may lag one loop iteration. Phase transitions go through a mutex.
pub struct StreamState {
    lifecycle: Mutex<Lifecycle>,
    read_frame_count: AtomicU64,
    frame_interval: AtomicU64,
    fps_bits: AtomicU64,
    handoffs_attempted: AtomicU64,
    samples_dropped: AtomicU64,
}

impl StreamState {
    pub fn new(frame_interval: u64) -> PipelineResult<Self> {
        validate_interval(frame_interval)?;
        Ok(Self {
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Idle,
                generation: 0,
                latest_run: 0,
                source: None,
            }),
            read_frame_count: AtomicU64::new(0),
            frame_interval: AtomicU64::new(frame_interval),
            fps_bits: AtomicU64::new(0f64.to_bits()),
            handoffs_attempted: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
        })
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle().phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase(), Phase::Opening | Phase::Streaming)
    }

    pub fn source(&self) -> Option<String> {
        self.lifecycle().source.clone()
    }

    pub fn read_frame_count(&self) -> u64 {
        self.read_frame_count.load(Ordering::Relaxed)
    }

    pub fn frame_interval(&self) -> u64 {
        self.frame_interval.load(Ordering::Relaxed)
    }

    pub fn set_frame_interval(&self, interval: u64) -> PipelineResult<()> {
        validate_interval(interval)?;
        self.frame_interval.store(interval, Ordering::Relaxed);
        Ok(())
    }

    pub fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_fps(&self, fps: f64) {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 0.0 };
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    pub fn handoffs_attempted(&self) -> u64 {
        self.handoffs_attempted.load(Ordering::Relaxed)
    }

    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped.load(Ordering::Relaxed)
    }

    /// Count one non-empty frame. Wraps to 0 past `u64::MAX`.
    /// Returns the new count.
    pub(crate) fn record_read(&self) -> u64 {
        self.read_frame_count
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    /// Whether the frame that brought the count to `count` is sampled.
    pub(crate) fn is_sample_due(&self, count: u64) -> bool {
        count % self.frame_interval().max(1) == 0
    }

    pub(crate) fn record_handoff_attempt(&self) {
        self.handoffs_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_sample(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            fps: self.fps(),
            read_frame_count: self.read_frame_count(),
            frame_interval: self.frame_interval(),
        }
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        let (phase, source) = {
            let lifecycle = self.lifecycle();
            (lifecycle.phase, lifecycle.source.clone())
        };
        StreamSnapshot {
            source,
            phase,
            is_running: matches!(phase, Phase::Opening | Phase::Streaming),
            read_frame_count: self.read_frame_count(),
            frame_interval: self.frame_interval(),
            fps: self.fps(),
            handoffs_attempted: self.handoffs_attempted(),
            samples_dropped: self.samples_dropped(),
        }
    }

    /// Idle -> Opening. Returns the new run's generation, or `None` if a run
    /// is already active.
    pub(crate) fn begin_run(&self, source: &str) -> Option<u64> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.phase != Phase::Idle {
            return None;
        }
        lifecycle.generation = lifecycle.generation.wrapping_add(1);
        lifecycle.latest_run = lifecycle.generation;
        lifecycle.phase = Phase::Opening;
        lifecycle.source = Some(source.to_string());
        self.read_frame_count.store(0, Ordering::Relaxed);
        self.handoffs_attempted.store(0, Ordering::Relaxed);
        self.samples_dropped.store(0, Ordering::Relaxed);
        Some(lifecycle.generation)
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.lifecycle().generation == generation
    }

    /// Move the current run from `from` to `to`. No-op for a stale generation.
    pub(crate) fn transition(&self, generation: u64, from: Phase, to: Phase) -> bool {
        let mut lifecycle = self.lifecycle();
        if lifecycle.generation != generation || lifecycle.phase != from {
            return false;
        }
        lifecycle.phase = to;
        true
    }

    /// Finish the run identified by `generation`: reset the read count and go
    /// Idle. Returns false if the run was already retired.
    pub(crate) fn finish_run(&self, generation: u64) -> bool {
        let mut lifecycle = self.lifecycle();
        if lifecycle.generation != generation {
            return false;
        }
        lifecycle.phase = Phase::Idle;
        self.read_frame_count.store(0, Ordering::Relaxed);
        true
    }

    /// Retire whatever run is current and go Idle.
    pub(crate) fn retire(&self) {
        let mut lifecycle = self.lifecycle();
        lifecycle.generation = lifecycle.generation.wrapping_add(1);
        lifecycle.phase = Phase::Idle;
        self.read_frame_count.store(0, Ordering::Relaxed);
    }

    /// Run `release` on behalf of a retired run, unless a newer run has begun
    /// since. The lifecycle lock is held throughout, so no run can begin
    /// while the release is in progress. Returns whether `release` ran.
    pub(crate) fn release_abandoned(&self, generation: u64, release: impl FnOnce()) -> bool {
        let lifecycle = self.lifecycle();
        if lifecycle.generation == generation || lifecycle.latest_run != generation {
            return false;
        }
        release();
        true
    }

    #[cfg(test)]
    pub(crate) fn force_read_count(&self, count: u64) {
        self.read_frame_count.store(count, Ordering::Relaxed);
    }
}

fn validate_interval(interval: u64) -> PipelineResult<()> {
    if interval == 0 {
        return Err(PipelineError::InvalidFrameInterval(interval));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_count_wraps_to_zero() {
        let state = StreamState::new(1).unwrap();
        state.force_read_count(u64::MAX - 1);

        assert_eq!(state.record_read(), u64::MAX);
        assert_eq!(state.record_read(), 0);
        assert_eq!(state.record_read(), 1);
    }

    #[test]
    fn frame_interval_rejects_zero() {
        assert!(StreamState::new(0).is_err());

        let state = StreamState::new(DEFAULT_FRAME_INTERVAL).unwrap();
        assert_eq!(
            state.set_frame_interval(0),
            Err(PipelineError::InvalidFrameInterval(0))
        );
        assert_eq!(state.frame_interval(), DEFAULT_FRAME_INTERVAL);

        state.set_frame_interval(3).unwrap();
        assert_eq!(state.frame_interval(), 3);
    }

    #[test]
    fn decimation_selects_every_kth_frame() {
        for k in 1..=7u64 {
            let state = StreamState::new(k).unwrap();
            let reads = 50u64;
            let sampled = (0..reads)
                .filter(|_| {
                    let count = state.record_read();
                    state.is_sample_due(count)
                })
                .count() as u64;
            assert_eq!(sampled, reads / k, "interval {k}");
        }
    }

    #[test]
    fn stale_generations_cannot_mutate_state() {
        let state = StreamState::new(1).unwrap();
        let first = state.begin_run("stub://a").unwrap();
        assert!(state.begin_run("stub://b").is_none(), "already running");

        state.retire();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(!state.transition(first, Phase::Opening, Phase::Streaming));
        assert!(!state.finish_run(first));

        let second = state.begin_run("stub://b").unwrap();
        assert!(state.transition(second, Phase::Opening, Phase::Streaming));
        assert!(state.is_running());
        state.record_read();
        assert!(state.finish_run(second));
        assert_eq!(state.read_frame_count(), 0);
        assert_eq!(state.source().as_deref(), Some("stub://b"));
    }

    #[test]
    fn abandoned_run_releases_only_until_a_newer_run_begins() {
        let state = StreamState::new(1).unwrap();
        let first = state.begin_run("stub://a").unwrap();
        assert!(!state.release_abandoned(first, || {}), "still current");

        state.retire();
        state.retire();
        let mut released = false;
        assert!(state.release_abandoned(first, || released = true));
        assert!(released);

        let second = state.begin_run("stub://b").unwrap();
        assert!(!state.release_abandoned(first, || panic!("newer run owns the source")));
        state.retire();
        assert!(state.release_abandoned(second, || {}));
    }

    #[test]
    fn fps_ignores_nonsense_values() {
        let state = StreamState::new(1).unwrap();
        state.set_fps(f64::NAN);
        assert_eq!(state.fps(), 0.0);
        state.set_fps(29.97);
        assert_eq!(state.fps(), 29.97);
    }

    #[test]
    fn telemetry_reports_processed_frames() {
        let telemetry = Telemetry {
            fps: 25.0,
            read_frame_count: 17,
            frame_interval: 5,
        };
        assert_eq!(telemetry.processed_frames(), 3);
    }
}
