use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::processor::ProcessorOptions;
use crate::stream::{DEFAULT_EMPTY_READ_BACKOFF, DEFAULT_FRAME_INTERVAL, DEFAULT_STOP_GRACE};

pub const CONFIG_ENV: &str = "STREAMWATCH_CONFIG";

const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_DETECTOR: &str = "motion";
const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AppConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    id: Option<String>,
    frame_interval: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    stop_grace_ms: Option<u64>,
    event_capacity: Option<usize>,
    font_path: Option<PathBuf>,
    max_consecutive_empty_reads: Option<u32>,
    empty_read_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// Device index, URL or local path.
    pub id: String,
    pub frame_interval: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub stop_grace: Duration,
    pub event_capacity: usize,
    pub font_path: Option<PathBuf>,
    pub max_consecutive_empty_reads: Option<u32>,
    pub empty_read_backoff: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_file(AppConfigFile::default())
    }
}

impl AppConfig {
    /// Load from the file named by `STREAMWATCH_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file instead of the environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => AppConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        Self {
            source: SourceSettings {
                id: source.id.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                frame_interval: source.frame_interval.unwrap_or(DEFAULT_FRAME_INTERVAL),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                model_path: detector.model_path,
                labels_path: detector.labels_path,
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: detector.confidence_threshold,
            },
            pipeline: PipelineSettings {
                stop_grace: pipeline
                    .stop_grace_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_STOP_GRACE),
                event_capacity: pipeline.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY),
                font_path: pipeline.font_path,
                max_consecutive_empty_reads: pipeline.max_consecutive_empty_reads,
                empty_read_backoff: pipeline
                    .empty_read_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_EMPTY_READ_BACKOFF),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("STREAMWATCH_SOURCE") {
            if !source.trim().is_empty() {
                self.source.id = source;
            }
        }
        if let Ok(interval) = std::env::var("STREAMWATCH_FRAME_INTERVAL") {
            self.source.frame_interval = interval.trim().parse().map_err(|_| {
                anyhow!("STREAMWATCH_FRAME_INTERVAL must be a positive integer")
            })?;
        }
        if let Ok(detector) = std::env::var("STREAMWATCH_DETECTOR") {
            if !detector.trim().is_empty() {
                self.detector.backend = detector.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("STREAMWATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    /// Checks cross-field rules. Called by `load`; call again after applying
    /// command-line overrides.
    pub fn validate(&self) -> Result<()> {
        if self.source.id.trim().is_empty() {
            return Err(config_error("source id must not be empty"));
        }
        if self.source.frame_interval == 0 {
            return Err(PipelineError::InvalidFrameInterval(0).into());
        }
        if let Some(threshold) = self.detector.confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(config_error(format!(
                    "confidence threshold must be within [0, 1], got {threshold}"
                )));
            }
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(config_error("the tract detector requires model_path"));
        }
        if self.detector.input_size == 0 {
            return Err(config_error("detector input_size must be greater than zero"));
        }
        if self.pipeline.event_capacity == 0 {
            return Err(config_error("event capacity must be at least 1"));
        }
        if self.pipeline.max_consecutive_empty_reads == Some(0) {
            return Err(config_error(
                "max_consecutive_empty_reads must be at least 1 when set",
            ));
        }
        Ok(())
    }

    /// Whether annotations get label and status text. Boxes are drawn either
    /// way; text needs a font file.
    pub fn renders_text(&self) -> bool {
        self.pipeline.font_path.is_some()
    }

    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            frame_interval: self.source.frame_interval,
            stop_grace: self.pipeline.stop_grace,
            confidence_threshold: self.detector.confidence_threshold,
            font_path: self.pipeline.font_path.clone(),
            event_capacity: self.pipeline.event_capacity,
            empty_read_backoff: self.pipeline.empty_read_backoff,
            max_consecutive_empty_reads: self.pipeline.max_consecutive_empty_reads,
        }
    }
}

fn config_error(message: impl Into<String>) -> anyhow::Error {
    PipelineError::Config(message.into()).into()
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?
    } else {
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))?
    };
    Ok(cfg)
}
