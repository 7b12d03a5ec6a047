//! pinkeeper.toml 통합 설정 테스트
//!
//! - pinkeeper.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use pinkeeper_core::config::{DepPaths, PinkeeperConfig};
use pinkeeper_core::error::{ConfigError, PinkeeperError};
use pinkeeper_core::types::Severity;

const EXAMPLE: &str = include_str!("../../../pinkeeper.toml.example");

// =============================================================================
// pinkeeper.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = PinkeeperConfig::parse(EXAMPLE).expect("example config should parse");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.workspace.dep_paths, Some(DepPaths::Workspace));
    assert!(config.workspace.include_dev);
}

#[test]
fn example_config_passes_validation() {
    let config = PinkeeperConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_defaults() {
    let example = PinkeeperConfig::parse(EXAMPLE).expect("should parse");
    let defaults = PinkeeperConfig::default();
    assert_eq!(example.security.providers, defaults.security.providers);
    assert_eq!(example.security.timeout_secs, defaults.security.timeout_secs);
    assert_eq!(
        example.security.severity_threshold,
        defaults.security.severity_threshold
    );
    assert_eq!(example.mode.force, defaults.mode.force);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_only_security_section() {
    let config = PinkeeperConfig::parse(
        r#"
[security]
enabled = true
severity_threshold = "critical"
"#,
    )
    .expect("should parse");
    config.validate().expect("should validate");
    assert_eq!(config.severity_threshold(), Severity::Critical);
    // 다른 섹션은 기본값
    assert_eq!(config.workspace.root, ".");
    assert_eq!(config.security.providers.len(), 1);
}

#[test]
fn unknown_fields_are_ignored() {
    let config = PinkeeperConfig::parse("[general]\nlog_level = \"warn\"\nfuture_knob = 1")
        .expect("unknown fields tolerated");
    assert_eq!(config.general.log_level, "warn");
}

#[test]
fn malformed_toml_is_parse_error() {
    let result = PinkeeperConfig::parse("[security\nenabled = true");
    assert!(matches!(
        result,
        Err(PinkeeperError::Config(ConfigError::ParseFailed { .. }))
    ));
}

#[test]
fn wrong_type_is_parse_error() {
    let result = PinkeeperConfig::parse("[security]\ntimeout_secs = \"soon\"");
    assert!(result.is_err());
}

// =============================================================================
// 파일 로딩 + 환경변수 우선순위
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn load_from_file_then_env_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pinkeeper.toml");
    std::fs::write(
        &path,
        "[security]\nenabled = true\nseverity_threshold = \"low\"\n",
    )
    .expect("write config");

    // SAFETY: serial_test로 직렬 실행되므로 환경변수 조작이 안전합니다.
    unsafe { std::env::set_var("PINKEEPER_SECURITY_SEVERITY_THRESHOLD", "high") };
    let result = PinkeeperConfig::load(&path).await;
    unsafe { std::env::remove_var("PINKEEPER_SECURITY_SEVERITY_THRESHOLD") };

    let config = result.expect("should load");
    assert!(config.security.enabled);
    assert_eq!(config.severity_threshold(), Severity::High);
}

#[tokio::test]
#[serial_test::serial]
async fn env_override_producing_invalid_value_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pinkeeper.toml");
    std::fs::write(&path, "").expect("write config");

    // SAFETY: serial_test로 직렬 실행되므로 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("PINKEEPER_MODE_FORCE", "true");
        std::env::set_var("PINKEEPER_MODE_INTERACTIVE", "true");
    }
    let result = PinkeeperConfig::load(&path).await;
    unsafe {
        std::env::remove_var("PINKEEPER_MODE_FORCE");
        std::env::remove_var("PINKEEPER_MODE_INTERACTIVE");
    }

    assert!(matches!(
        result,
        Err(PinkeeperError::Config(ConfigError::InvalidValue { .. }))
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn env_dep_paths_override() {
    // SAFETY: serial_test로 직렬 실행되므로 환경변수 조작이 안전합니다.
    unsafe { std::env::set_var("PINKEEPER_WORKSPACE_DEP_PATHS", "packages/*,apps/*") };
    let result = PinkeeperConfig::load_or_default("/nonexistent/pinkeeper.toml").await;
    unsafe { std::env::remove_var("PINKEEPER_WORKSPACE_DEP_PATHS") };

    let config = result.expect("should load defaults");
    assert_eq!(
        config.workspace.dep_paths,
        Some(DepPaths::Globs(vec![
            "packages/*".to_owned(),
            "apps/*".to_owned()
        ]))
    );
}
