use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use streamwatch::config::AppConfig;
use streamwatch::PipelineError;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "STREAMWATCH_CONFIG",
        "STREAMWATCH_SOURCE",
        "STREAMWATCH_FRAME_INTERVAL",
        "STREAMWATCH_DETECTOR",
        "STREAMWATCH_MODEL_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_toml_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [source]
        id = "rtsp://camera-1/stream"
        frame_interval = 10

        [detector]
        backend = "stub"
        input_size = 320
        confidence_threshold = 0.6

        [pipeline]
        stop_grace_ms = 250
        event_capacity = 8
        max_consecutive_empty_reads = 100
        empty_read_backoff_ms = 20
    "#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("STREAMWATCH_CONFIG", file.path());
    std::env::set_var("STREAMWATCH_SOURCE", "0");
    std::env::set_var("STREAMWATCH_MODEL_PATH", "/models/yolov8n.onnx");

    let cfg = AppConfig::load().expect("load config");

    assert_eq!(cfg.source.id, "0");
    assert_eq!(cfg.source.frame_interval, 10);
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.detector.confidence_threshold, Some(0.6));
    assert_eq!(
        cfg.detector.model_path,
        Some(PathBuf::from("/models/yolov8n.onnx"))
    );
    assert_eq!(cfg.pipeline.stop_grace, Duration::from_millis(250));
    assert_eq!(cfg.pipeline.event_capacity, 8);
    assert_eq!(cfg.pipeline.max_consecutive_empty_reads, Some(100));
    assert_eq!(cfg.pipeline.empty_read_backoff, Duration::from_millis(20));

    let options = cfg.processor_options();
    assert_eq!(options.frame_interval, 10);
    assert_eq!(options.event_capacity, 8);

    clear_env();
}

#[test]
fn loads_json_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "source": { "id": "stub://yard?fps=5", "frame_interval": 2 },
        "detector": { "backend": "motion" }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    let cfg = AppConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.source.id, "stub://yard?fps=5");
    assert_eq!(cfg.source.frame_interval, 2);
    assert_eq!(cfg.detector.backend, "motion");
    assert_eq!(cfg.pipeline.event_capacity, 64);

    clear_env();
}

#[test]
fn defaults_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("load defaults");
    assert_eq!(cfg, AppConfig::default());
    assert_eq!(cfg.source.id, "stub://camera");
    assert_eq!(cfg.source.frame_interval, 5);
    assert_eq!(cfg.pipeline.stop_grace, Duration::from_millis(100));
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("STREAMWATCH_FRAME_INTERVAL", "0");
    let err = AppConfig::load().expect_err("zero interval");
    assert_eq!(
        err.downcast_ref::<PipelineError>(),
        Some(&PipelineError::InvalidFrameInterval(0))
    );

    std::env::set_var("STREAMWATCH_FRAME_INTERVAL", "often");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("STREAMWATCH_DETECTOR", "tract");
    let err = AppConfig::load().expect_err("tract without model");
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Config(_))
    ));
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"[source]\nunknown_key = 1\n")
        .expect("write config");
    assert!(AppConfig::load_from(Some(file.path())).is_err());
}
