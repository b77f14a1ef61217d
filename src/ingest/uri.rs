//! Network stream and local file source using GStreamer.
//!
//! `rtsp://` URLs go through `rtspsrc` with zero latency; every other URL
//! scheme and local paths go through `uridecodebin`. Both end in an RGB
//! `appsink` that keeps only the newest buffer, so a slow reader never builds
//! up a backlog inside the decoder.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;
use url::Url;

use super::{FrameSource, SourceId};
use crate::frame::Frame;

const PULL_TIMEOUT: Duration = Duration::from_millis(500);

struct GstPipeline {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
}

/// GStreamer-backed source for URLs and local files.
pub struct UriSource {
    active: Mutex<Option<GstPipeline>>,
    opened: AtomicBool,
    fps_bits: AtomicU64,
    frames_captured: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl UriSource {
    pub fn new() -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;
        Ok(Self {
            active: Mutex::new(None),
            opened: AtomicBool::new(false),
            fps_bits: AtomicU64::new(0f64.to_bits()),
            frames_captured: AtomicU64::new(0),
            last_error: Mutex::new(None),
        })
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    fn pipeline_description(source: &SourceId) -> Result<String> {
        let sink = "videoconvert ! video/x-raw,format=RGB ! \
                    appsink name=appsink sync=false max-buffers=1 drop=true";
        match source {
            SourceId::Url(url) if url.scheme() == "rtsp" => Ok(format!(
                "rtspsrc location={} latency=0 ! decodebin ! {}",
                url, sink
            )),
            SourceId::Url(url) => Ok(format!("uridecodebin uri={} ! {}", url, sink)),
            SourceId::Path(path) => {
                let absolute = std::fs::canonicalize(path)
                    .with_context(|| format!("resolve local video file {}", path.display()))?;
                let uri = Url::from_file_path(&absolute)
                    .map_err(|_| anyhow!("cannot build file URI for {}", absolute.display()))?;
                Ok(format!("uridecodebin uri={} ! {}", uri, sink))
            }
            SourceId::Device(_) => Err(anyhow!("UriSource does not open device indexes")),
        }
    }

    fn build(description: &str) -> Result<GstPipeline> {
        let pipeline = gstreamer::parse::launch(description)
            .context("build capture pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("capture pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok(GstPipeline { pipeline, appsink })
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    fn poll_bus(&self, pipeline: &gstreamer::Pipeline) {
        let Some(bus) = pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    let text = format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                    log::warn!("UriSource: {}", text);
                    self.record_error(text);
                }
                MessageView::Eos(..) => {
                    self.record_error("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }
}

impl FrameSource for UriSource {
    fn open(&self, source: &SourceId) -> Result<bool> {
        self.release()?;
        let description = Self::pipeline_description(source)?;
        let gst = Self::build(&description)?;

        if gst.pipeline.set_state(gstreamer::State::Playing).is_err() {
            let _ = gst.pipeline.set_state(gstreamer::State::Null);
            log::warn!("UriSource: {} refused to start playing", source);
            return Ok(false);
        }

        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(gst);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.frames_captured.store(0, Ordering::Relaxed);
        self.opened.store(true, Ordering::SeqCst);
        log::info!("UriSource: connected to {}", source);
        Ok(true)
    }

    fn retrieve_frame(&self) -> Result<Option<Frame>> {
        // GStreamer objects are reference counted; clone the handles so the
        // lock is not held while blocking on the sink.
        let handles = {
            let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            active
                .as_ref()
                .map(|gst| (gst.pipeline.clone(), gst.appsink.clone()))
        };
        let Some((pipeline, appsink)) = handles else {
            return Ok(None);
        };

        self.poll_bus(&pipeline);

        let timeout = gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT.as_millis() as u64);
        let Some(sample) = appsink.try_pull_sample(timeout) else {
            return Ok(None);
        };

        let caps = sample.caps().context("sample missing caps")?;
        let info =
            gstreamer_video::VideoInfo::from_caps(caps).context("parse sample caps as video info")?;
        let rate = info.fps();
        if rate.denom() > 0 && rate.numer() > 0 {
            let fps = f64::from(rate.numer()) / f64::from(rate.denom());
            self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
        }

        let (pixels, width, height) = sample_to_pixels(&sample, &info)?;
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        Frame::from_rgb(width, height, pixels).map(Some)
    }

    fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    fn release(&self) -> Result<()> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.opened.store(false, Ordering::SeqCst);
        self.fps_bits.store(0f64.to_bits(), Ordering::Relaxed);
        if let Some(gst) = active {
            gst.pipeline
                .set_state(gstreamer::State::Null)
                .context("set capture pipeline to Null")?;
            log::info!("UriSource: released");
        }
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }
}

fn sample_to_pixels(
    sample: &gstreamer::Sample,
    info: &gstreamer_video::VideoInfo,
) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("sample missing buffer")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map sample buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(data.get(start..end).context("buffer row is out of bounds")?);
    }

    Ok((pixels, width, height))
}
