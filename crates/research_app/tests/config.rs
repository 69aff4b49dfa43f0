use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use research_app::platform::config::{AppConfig, ConfigError, ConfigOverrides};
use research_engine::StreamMode;

#[test]
fn defaults_point_at_local_service() {
    let config = AppConfig::default();
    assert_eq!(config.service_url, "http://localhost:8000");
    assert!(config.streaming);
    assert_eq!(config.stream_mode(), StreamMode::Streaming);

    let settings = config.service_settings();
    assert_eq!(settings.connect_timeout, Duration::from_secs(10));
    assert_eq!(settings.request_timeout, Duration::from_secs(300));
}

#[test]
fn partial_file_keeps_remaining_defaults() {
    let config = AppConfig::parse(
        r#"(
            service_url: "https://research.example.com/api",
            streaming: false,
            state_dir: "state",
        )"#,
    )
    .unwrap();

    assert_eq!(
        config,
        AppConfig {
            service_url: "https://research.example.com/api".into(),
            streaming: false,
            state_dir: PathBuf::from("state"),
            ..AppConfig::default()
        }
    );
    assert_eq!(config.stream_mode(), StreamMode::SingleShot);
}

#[test]
fn explicit_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.ron");
    fs::write(&path, "(connect_timeout_secs: 3, request_timeout_secs: 30)").unwrap();

    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.connect_timeout_secs, 3);
    assert_eq!(
        config.service_settings().request_timeout,
        Duration::from_secs(30)
    );
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::load(Some(&dir.path().join("absent.ron"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn malformed_file_reports_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.ron");
    fs::write(&path, "(service_url: 42)").unwrap();

    let err = AppConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("bad.ron"));
}

#[test]
fn overrides_take_precedence() {
    let mut config = AppConfig::default();
    config.apply_overrides(&ConfigOverrides {
        service_url: Some(" http://other:9000 ".into()),
        no_stream: true,
    });
    assert_eq!(config.service_url, "http://other:9000");
    assert!(!config.streaming);

    // Blank overrides leave the file value alone.
    config.apply_overrides(&ConfigOverrides {
        service_url: Some("  ".into()),
        no_stream: false,
    });
    assert_eq!(config.service_url, "http://other:9000");
    assert!(!config.streaming);
}
