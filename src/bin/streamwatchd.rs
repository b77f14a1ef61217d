//! streamwatchd - run the detection pipeline against one video source
//!
//! This daemon:
//! 1. Loads configuration (file, env, then command-line overrides)
//! 2. Builds the selected detector and the capture source
//! 3. Starts the processor and consumes its events on the main thread
//! 4. Optionally writes every published frame to a PNG snapshot
//! 5. Stops on Ctrl-C or after `--seconds`, then disposes

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use streamwatch::detect::{MotionBackend, StubBackend};
use streamwatch::{
    AppConfig, CaptureSource, DetectorRegistry, PipelineEvent, SharedDetector, VideoProcessor,
};

const EVENT_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Device index, URL (rtsp://, http://, stub://) or local file path.
    #[arg(long)]
    source: Option<String>,
    /// Process every Nth frame.
    #[arg(long)]
    frame_interval: Option<u64>,
    /// Detector backend name (motion, stub, tract).
    #[arg(long)]
    detector: Option<String>,
    /// ONNX model path for the tract detector.
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, value_name = "PATH", env = "STREAMWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Write each published frame to this PNG file. Labels and status text
    /// are drawn only when `font_path` is configured; otherwise the PNG
    /// carries boxes alone.
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
    /// Print a JSON stream snapshot after every published frame.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = AppConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.id = source;
    }
    if let Some(interval) = args.frame_interval {
        cfg.source.frame_interval = interval;
    }
    if let Some(detector) = args.detector {
        cfg.detector.backend = detector;
    }
    if let Some(model) = args.model {
        cfg.detector.model_path = Some(model);
    }
    cfg.validate()?;
    if !cfg.renders_text() {
        log::warn!(
            "streamwatchd: no font_path configured, annotations get boxes but no label or status text"
        );
    }

    let detector = build_detector(&cfg)?;
    let processor = VideoProcessor::new(
        Arc::new(CaptureSource::new()),
        detector,
        cfg.processor_options(),
    )?;
    let events = processor.subscribe();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    log::info!(
        "streamwatchd: source={} detector={} frame_interval={}",
        cfg.source.id,
        cfg.detector.backend,
        cfg.source.frame_interval
    );
    processor.start(&cfg.source.id);

    let deadline = args
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));
    while !shutdown.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::info!("streamwatchd: run time elapsed");
            break;
        }
        match events.recv_timeout(EVENT_POLL) {
            Ok(PipelineEvent::FrameUpdated) => {
                if let Some(path) = &args.snapshot {
                    if let Err(err) = write_snapshot(&processor, path) {
                        log::warn!("streamwatchd: {:#}", err);
                    }
                }
                if args.json {
                    println!("{}", serde_json::to_string(&processor.snapshot())?);
                }
            }
            // Already logged by the event bus.
            Ok(PipelineEvent::Status(_)) => {}
            Ok(PipelineEvent::Error(_)) => {
                if !processor.is_running() && args.seconds.is_none() {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    processor.stop();
    processor.dispose();
    Ok(())
}

fn build_detector(cfg: &AppConfig) -> Result<SharedDetector> {
    let mut registry = DetectorRegistry::new();
    registry.register(MotionBackend::new());
    registry.register(StubBackend::default());

    #[cfg(feature = "backend-tract")]
    {
        if let Some(model_path) = &cfg.detector.model_path {
            let mut backend =
                streamwatch::detect::TractBackend::new(model_path, cfg.detector.input_size)?;
            if let Some(threshold) = cfg.detector.confidence_threshold {
                backend = backend.with_threshold(threshold);
            }
            if let Some(labels) = &cfg.detector.labels_path {
                backend = backend.with_labels_file(labels)?;
            }
            registry.register(backend);
        }
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        if cfg.detector.backend == "tract" {
            return Err(anyhow!(
                "the tract detector requires the backend-tract feature"
            ));
        }
    }

    registry.set_default(&cfg.detector.backend)?;
    registry
        .default_detector()
        .ok_or_else(|| anyhow!("no detector registered"))
}

fn write_snapshot(processor: &VideoProcessor, path: &Path) -> Result<()> {
    let Some(frame) = processor.peek() else {
        return Ok(());
    };
    frame
        .into_image()
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write snapshot {}", path.display()))
}
