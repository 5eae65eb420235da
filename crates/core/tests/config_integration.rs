//! oasis-testkit.toml 통합 설정 테스트
//!
//! - oasis-testkit.toml.example 파싱 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use std::io::Write;

use oasis_core::config::{CONFIG_PATH_ENV, TestkitConfig};
use oasis_core::error::{ConfigError, OasisError};
use serial_test::serial;

// =============================================================================
// oasis-testkit.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let content = include_str!("../../../oasis-testkit.toml.example");
    let config = TestkitConfig::parse(content).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../oasis-testkit.toml.example");
    let from_file = TestkitConfig::parse(content).expect("should parse");
    let from_code = TestkitConfig::default();

    assert_eq!(from_file.general.log_level, from_code.general.log_level);
    assert_eq!(from_file.general.log_format, from_code.general.log_format);
    assert_eq!(from_file.suite.temp_prefix, from_code.suite.temp_prefix);
    assert_eq!(
        from_file.suite.scratch_dir_name,
        from_code.suite.scratch_dir_name
    );
    assert_eq!(from_file.cli.binary, from_code.cli.binary);
    assert_eq!(from_file.cli.args, from_code.cli.args);
    assert_eq!(from_file.scheduler.binary, from_code.scheduler.binary);
    assert_eq!(from_file.scheduler.version, from_code.scheduler.version);
    assert_eq!(from_file.scheduler.args, from_code.scheduler.args);
    assert_eq!(from_file.scheduler.readiness, from_code.scheduler.readiness);
    assert_eq!(from_file.scheduler.ready_addr, from_code.scheduler.ready_addr);
    assert_eq!(
        from_file.scheduler.ready_timeout_secs,
        from_code.scheduler.ready_timeout_secs
    );
    assert_eq!(
        from_file.scheduler.stop_grace_secs,
        from_code.scheduler.stop_grace_secs
    );
}

// =============================================================================
// 파일 로딩 + 환경변수 오버라이드
// =============================================================================

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("failed to write config");
    file.flush().expect("failed to flush config");
    file
}

#[tokio::test]
#[serial]
async fn load_applies_env_overrides_over_file() {
    let file = write_config("[scheduler]\nbinary = \"/opt/nomad\"\nready_timeout_secs = 5\n");

    // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
    unsafe { std::env::set_var("OASIS_SCHEDULER_READY_TIMEOUT_SECS", "12") };
    let config = TestkitConfig::load(file.path()).await;
    unsafe { std::env::remove_var("OASIS_SCHEDULER_READY_TIMEOUT_SECS") };

    let config = config.expect("config should load");
    assert_eq!(config.scheduler.binary, "/opt/nomad");
    assert_eq!(config.scheduler.ready_timeout_secs, 12);
}

#[tokio::test]
#[serial]
async fn load_rejects_env_override_that_breaks_validation() {
    let file = write_config("");

    // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
    unsafe { std::env::set_var("OASIS_SCHEDULER_VERSION", "latest") };
    let result = TestkitConfig::load(file.path()).await;
    unsafe { std::env::remove_var("OASIS_SCHEDULER_VERSION") };

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        OasisError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
#[serial]
async fn from_env_uses_config_path_variable() {
    let file = write_config("[cli]\nbinary = \"/usr/local/bin/oasis\"\n");

    // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
    unsafe { std::env::set_var(CONFIG_PATH_ENV, file.path()) };
    let result = TestkitConfig::from_env().await;
    unsafe { std::env::remove_var(CONFIG_PATH_ENV) };

    let config = result.expect("config should load from env path");
    assert_eq!(config.cli.binary, "/usr/local/bin/oasis");
}

#[tokio::test]
#[serial]
async fn from_env_without_path_uses_defaults() {
    // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
    unsafe { std::env::remove_var(CONFIG_PATH_ENV) };
    let config = TestkitConfig::from_env().await.expect("defaults are valid");
    assert_eq!(config.scheduler.binary, "nomad");
}

#[tokio::test]
async fn from_file_with_invalid_toml_fails_to_parse() {
    let file = write_config("[scheduler\nbinary = ");
    let err = TestkitConfig::from_file(file.path()).await.unwrap_err();
    assert!(matches!(
        err,
        OasisError::Config(ConfigError::ParseFailed { .. })
    ));
}
