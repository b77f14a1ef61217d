//! Synthetic frame source (`stub://` URLs).
//!
//! Produces a deterministic scene: a static gradient background with a bright
//! square sweeping across it, so motion detection has something to find.
//! Frames are paced to the configured fps like a real camera would be.
//!
//! Query parameters: `width`, `height`, `fps`, and `frames` (stop producing
//! frames after this many; later reads come back empty).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use url::Url;

use super::{FrameSource, SourceId};
use crate::frame::Frame;

/// Configuration for a synthetic source.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            frame_limit: None,
        }
    }
}

impl SyntheticConfig {
    pub fn from_url(url: &Url) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "width" => config.width = parse_param(&key, &value)?,
                "height" => config.height = parse_param(&key, &value)?,
                "fps" => config.fps = parse_param(&key, &value)?,
                "frames" => config.frame_limit = Some(parse_param(&key, &value)?),
                other => log::warn!("SyntheticSource: ignoring unknown parameter '{}'", other),
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source needs a non-zero frame size"));
        }
        if !config.fps.is_finite() || config.fps < 0.0 {
            return Err(anyhow!("synthetic fps must be a finite, non-negative number"));
        }
        if config.fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / config.fps)
                .with_context(|| format!("synthetic fps {} is out of range", config.fps))?;
        }
        Ok(config)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid synthetic source parameter {key}={value}"))
}

struct SyntheticState {
    frame_count: u64,
    next_due: Option<Instant>,
}

/// Synthetic frame source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    opened: AtomicBool,
    state: Mutex<SyntheticState>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            opened: AtomicBool::new(false),
            state: Mutex::new(SyntheticState {
                frame_count: 0,
                next_due: None,
            }),
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame_count
    }

    fn frame_period(&self) -> Option<Duration> {
        if self.config.fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.config.fps).ok()
        } else {
            None
        }
    }

    fn render(&self, frame_count: u64) -> RgbImage {
        let (w, h) = (self.config.width, self.config.height);
        let side = (w.min(h) / 6).max(1);
        let travel = u64::from(w.saturating_sub(side).max(1));
        let square_x = (frame_count * 4 % travel) as u32;
        let square_y = (h - side) / 2;

        RgbImage::from_fn(w, h, |x, y| {
            let inside = x >= square_x && x < square_x + side && y >= square_y && y < square_y + side;
            if inside {
                Rgb([240, 240, 240])
            } else {
                let shade = (u64::from(x + y) * 96 / u64::from(w + h)) as u8;
                Rgb([shade, shade / 2 + 16, 64])
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    fn open(&self, source: &SourceId) -> Result<bool> {
        if !matches!(source, SourceId::Url(url) if url.scheme() == "stub") {
            return Ok(false);
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.frame_count = 0;
        state.next_due = None;
        self.opened.store(true, Ordering::SeqCst);
        log::info!(
            "SyntheticSource: connected to {} ({}x{} @ {} fps)",
            source,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        Ok(true)
    }

    fn retrieve_frame(&self) -> Result<Option<Frame>> {
        if !self.opened.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let frame_count = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(period) = self.frame_period() {
                let now = Instant::now();
                let due = state.next_due.unwrap_or(now);
                if due > now {
                    std::thread::sleep(due - now);
                }
                state.next_due = Some(due.max(now) + period);
            }
            if self
                .config
                .frame_limit
                .is_some_and(|limit| state.frame_count >= limit)
            {
                return Ok(None);
            }
            state.frame_count += 1;
            state.frame_count
        };

        if !self.opened.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(Frame::from_image(self.render(frame_count))))
    }

    fn fps(&self) -> f64 {
        self.config.fps
    }

    fn release(&self) -> Result<()> {
        if self.opened.swap(false, Ordering::SeqCst) {
            log::info!("SyntheticSource: released");
        }
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }
}
