//! V4L2 frame source for local cameras addressed by device index.
//!
//! Index `N` maps to `/dev/videoN`. Frames are requested as RGB3; frames whose
//! buffer does not match the negotiated size are returned as empty reads.
//!
//! The device and its mmap stream live behind a mutex held for the duration of
//! a capture. `release` from another thread marks the source closed; if a
//! capture is in progress, the reader drops the device when it returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::{FrameSource, SourceId};
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct ActiveDevice {
    state: DeviceState,
    width: u32,
    height: u32,
}

/// V4L2 frame source.
pub struct V4l2Source {
    active: Mutex<Option<ActiveDevice>>,
    opened: AtomicBool,
    fps_bits: AtomicU64,
}

impl V4l2Source {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            opened: AtomicBool::new(false),
            fps_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn connect(&self, index: u32) -> Result<ActiveDevice> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = format!("/dev/video{index}");
        let mut device =
            v4l::Device::with_path(&path).with_context(|| format!("open v4l2 device {path}"))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = DEFAULT_WIDTH;
        format.height = DEFAULT_HEIGHT;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Source: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        if &format.fourcc.repr != b"RGB3" {
            return Err(anyhow!(
                "{} does not support RGB3 capture (negotiated {})",
                path,
                format.fourcc
            ));
        }

        match device.params() {
            Ok(params) if params.interval.numerator > 0 => {
                let fps = f64::from(params.interval.denominator)
                    / f64::from(params.interval.numerator);
                self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(err) => log::warn!("V4l2Source: failed to read fps on {}: {}", path, err),
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Source: connected to {} ({}x{})",
            path,
            format.width,
            format.height
        );
        Ok(ActiveDevice {
            state,
            width: format.width,
            height: format.height,
        })
    }
}

impl Default for V4l2Source {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for V4l2Source {
    fn open(&self, source: &SourceId) -> Result<bool> {
        let SourceId::Device(index) = source else {
            return Ok(false);
        };
        self.release()?;
        let active = self.connect(*index)?;
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(active);
        self.opened.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn retrieve_frame(&self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.opened.load(Ordering::SeqCst) {
            // Released while we were capturing.
            active.take();
            return Ok(None);
        }
        let Some(device) = active.as_mut() else {
            return Ok(None);
        };
        let (width, height) = (device.width, device.height);
        let pixels = device
            .state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture v4l2 frame")?;

        if !self.opened.load(Ordering::SeqCst) {
            active.take();
            return Ok(None);
        }
        match Frame::from_rgb(width, height, pixels) {
            Ok(frame) => Ok(Some(frame)),
            Err(err) => {
                log::debug!("V4l2Source: skipping malformed frame: {}", err);
                Ok(None)
            }
        }
    }

    fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    fn release(&self) -> Result<()> {
        self.opened.store(false, Ordering::SeqCst);
        match self.active.try_lock() {
            Ok(mut active) => {
                if active.take().is_some() {
                    log::info!("V4l2Source: released");
                }
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().take();
            }
            // A capture is in flight; the reader drops the device when it returns.
            Err(TryLockError::WouldBlock) => {}
        }
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }
}
