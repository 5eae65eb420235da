//! 설정 관리 — oasis-testkit.toml 파싱 및 테스트 하네스 설정
//!
//! [`TestkitConfig`]는 fixture 하네스가 사용하는 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`OASIS_SCHEDULER_BINARY=/usr/local/bin/nomad` 형식)
//! 2. 설정 파일 (`OASIS_TESTKIT_CONFIG`가 가리키는 파일)
//! 3. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), oasis_core::error::OasisError> {
//! use oasis_core::config::TestkitConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TestkitConfig::load("oasis-testkit.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TestkitConfig::parse("[scheduler]\nversion = \"1.6.0\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, OasisError};

/// 설정 파일 경로를 지정하는 환경변수
pub const CONFIG_PATH_ENV: &str = "OASIS_TESTKIT_CONFIG";

/// 스케줄러 인자에서 데이터 디렉토리로 치환되는 플레이스홀더
pub const DATA_DIR_PLACEHOLDER: &str = "{data_dir}";

/// Oasis 테스트킷 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestkitConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스위트 임시 디렉토리 설정
    #[serde(default)]
    pub suite: SuiteConfig,
    /// 테스트 대상 CLI 설정
    #[serde(default)]
    pub cli: CliConfig,
    /// 백그라운드 스케줄러 서버 설정
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl TestkitConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, OasisError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `OASIS_TESTKIT_CONFIG`가 설정되어 있으면 해당 파일을, 아니면 기본값을 사용합니다.
    ///
    /// 두 경우 모두 환경변수 오버라이드와 검증을 거칩니다.
    pub async fn from_env() -> Result<Self, OasisError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::load(path).await,
            _ => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, OasisError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OasisError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                OasisError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, OasisError> {
        toml::from_str(toml_str).map_err(|e| {
            OasisError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `OASIS_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "OASIS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "OASIS_GENERAL_LOG_FORMAT");

        // Suite
        override_string(&mut self.suite.temp_prefix, "OASIS_SUITE_TEMP_PREFIX");
        override_string(
            &mut self.suite.scratch_dir_name,
            "OASIS_SUITE_SCRATCH_DIR_NAME",
        );

        // CLI
        override_string(&mut self.cli.binary, "OASIS_CLI_BINARY");
        override_csv(&mut self.cli.args, "OASIS_CLI_ARGS");

        // Scheduler
        override_string(&mut self.scheduler.binary, "OASIS_SCHEDULER_BINARY");
        override_string(&mut self.scheduler.version, "OASIS_SCHEDULER_VERSION");
        override_csv(&mut self.scheduler.args, "OASIS_SCHEDULER_ARGS");
        override_string(&mut self.scheduler.readiness, "OASIS_SCHEDULER_READINESS");
        override_string(&mut self.scheduler.ready_addr, "OASIS_SCHEDULER_READY_ADDR");
        override_string(
            &mut self.scheduler.ready_pattern,
            "OASIS_SCHEDULER_READY_PATTERN",
        );
        override_u64(
            &mut self.scheduler.ready_timeout_secs,
            "OASIS_SCHEDULER_READY_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.scheduler.stop_grace_secs,
            "OASIS_SCHEDULER_STOP_GRACE_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), OasisError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.suite.temp_prefix.is_empty() {
            return Err(invalid("suite.temp_prefix", "must not be empty"));
        }

        let scratch = &self.suite.scratch_dir_name;
        if scratch.is_empty() || scratch.contains(['/', '\\']) || scratch == "." || scratch == ".."
        {
            return Err(invalid(
                "suite.scratch_dir_name",
                "must be a single non-empty path component",
            ));
        }

        if self.cli.binary.is_empty() {
            return Err(invalid("cli.binary", "must not be empty"));
        }

        if self.scheduler.binary.is_empty() {
            return Err(invalid("scheduler.binary", "must not be empty"));
        }

        if let Err(e) = semver::Version::parse(&self.scheduler.version) {
            return Err(invalid(
                "scheduler.version",
                format!("'{}' is not a semver version: {e}", self.scheduler.version),
            ));
        }

        match self.scheduler.readiness.as_str() {
            "none" => {}
            "tcp" => {
                if self.scheduler.ready_addr.parse::<SocketAddr>().is_err() {
                    return Err(invalid(
                        "scheduler.ready_addr",
                        format!(
                            "'{}' is not a socket address (required for tcp readiness)",
                            self.scheduler.ready_addr
                        ),
                    ));
                }
            }
            "log-line" => {
                if self.scheduler.ready_pattern.is_empty() {
                    return Err(invalid(
                        "scheduler.ready_pattern",
                        "must not be empty for log-line readiness",
                    ));
                }
            }
            _ => {
                return Err(invalid(
                    "scheduler.readiness",
                    "must be one of: none, tcp, log-line",
                ));
            }
        }

        if self.scheduler.ready_timeout_secs == 0 {
            return Err(invalid(
                "scheduler.ready_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.scheduler.stop_grace_secs == 0 {
            return Err(invalid("scheduler.stop_grace_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> OasisError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty, compact)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "compact".to_owned(),
        }
    }
}

/// 스위트 임시 디렉토리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// 스위트 임시 루트 디렉토리 이름 접두어
    pub temp_prefix: String,
    /// 테스트별 scratch 하위 디렉토리 이름
    pub scratch_dir_name: String,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            temp_prefix: "oasis-testing-".to_owned(),
            scratch_dir_name: "scratch".to_owned(),
        }
    }
}

/// 테스트 대상 오케스트레이션 CLI 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// 실행 파일 경로 또는 이름
    pub binary: String,
    /// 모든 호출에 앞에 붙는 인자
    pub args: Vec<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: "oasis".to_owned(),
            args: Vec::new(),
        }
    }
}

/// 백그라운드 스케줄러 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 실행 파일 경로 또는 이름
    pub binary: String,
    /// 스케줄러 버전 (semver)
    pub version: String,
    /// 실행 인자 (`{data_dir}`는 스위트별 데이터 디렉토리로 치환)
    pub args: Vec<String>,
    /// 준비 상태 판정 방식 (none, tcp, log-line)
    pub readiness: String,
    /// tcp 준비 상태 판정 주소
    pub ready_addr: String,
    /// log-line 준비 상태 판정 문자열
    pub ready_pattern: String,
    /// 준비 대기 제한 시간 (초)
    pub ready_timeout_secs: u64,
    /// 정지 유예 시간 (초)
    pub stop_grace_secs: u64,
}

impl SchedulerConfig {
    /// 준비 대기 제한 시간
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// 정지 유예 시간
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            binary: "nomad".to_owned(),
            version: "0.9.1".to_owned(),
            args: vec!["agent".to_owned(), "-dev".to_owned()],
            readiness: "tcp".to_owned(),
            ready_addr: "127.0.0.1:4646".to_owned(),
            ready_pattern: String::new(),
            ready_timeout_secs: 30,
            stop_grace_secs: 10,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = TestkitConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.suite.temp_prefix, "oasis-testing-");
        assert_eq!(config.suite.scratch_dir_name, "scratch");
        assert_eq!(config.scheduler.binary, "nomad");
        assert_eq!(config.scheduler.version, "0.9.1");
        assert_eq!(config.scheduler.readiness, "tcp");
        assert_eq!(config.scheduler.ready_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn default_config_passes_validation() {
        TestkitConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = TestkitConfig::parse("").unwrap();
        assert_eq!(config.cli.binary, "oasis");
        assert_eq!(config.scheduler.args, vec!["agent", "-dev"]);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[scheduler]
binary = "/opt/nomad/bin/nomad"
readiness = "log-line"
ready_pattern = "agent started"
"#;
        let config = TestkitConfig::parse(toml).unwrap();
        assert_eq!(config.scheduler.binary, "/opt/nomad/bin/nomad");
        assert_eq!(config.scheduler.ready_pattern, "agent started");
        // version은 기본값 유지
        assert_eq!(config.scheduler.version, "0.9.1");
        config.validate().unwrap();
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = TestkitConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            OasisError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = TestkitConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_non_semver_scheduler_version() {
        let mut config = TestkitConfig::default();
        config.scheduler.version = "0.9".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scheduler.version"));
    }

    #[test]
    fn validate_rejects_bad_ready_addr_for_tcp() {
        let mut config = TestkitConfig::default();
        config.scheduler.ready_addr = "localhost".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ready_addr"));
    }

    #[test]
    fn validate_ignores_ready_addr_when_readiness_none() {
        let mut config = TestkitConfig::default();
        config.scheduler.readiness = "none".to_owned();
        config.scheduler.ready_addr = String::new();
        config.validate().unwrap();
    }

    #[test]
    fn validate_requires_pattern_for_log_line() {
        let mut config = TestkitConfig::default();
        config.scheduler.readiness = "log-line".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ready_pattern"));
    }

    #[test]
    fn validate_rejects_unknown_readiness() {
        let mut config = TestkitConfig::default();
        config.scheduler.readiness = "http".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_nested_scratch_dir_name() {
        let mut config = TestkitConfig::default();
        config.suite.scratch_dir_name = "a/b".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scratch_dir_name"));

        config.suite.scratch_dir_name = "..".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut config = TestkitConfig::default();
        config.scheduler.ready_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = TestkitConfig::default();
        config.scheduler.stop_grace_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TEST_OASIS_STR", "overridden") };
        override_string(&mut val, "TEST_OASIS_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_OASIS_STR") };
    }

    #[test]
    #[serial]
    fn env_override_u64_invalid_keeps_original() {
        let mut val = 30;
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TEST_OASIS_U64_BAD", "soon") };
        override_u64(&mut val, "TEST_OASIS_U64_BAD");
        assert_eq!(val, 30);
        unsafe { std::env::remove_var("TEST_OASIS_U64_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_csv_drops_empty_items() {
        let mut val = vec!["agent".to_owned()];
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TEST_OASIS_CSV", "agent, -dev, ,-bind=127.0.0.1") };
        override_csv(&mut val, "TEST_OASIS_CSV");
        assert_eq!(val, vec!["agent", "-dev", "-bind=127.0.0.1"]);
        unsafe { std::env::remove_var("TEST_OASIS_CSV") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = TestkitConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = TestkitConfig::parse(&toml_str).unwrap();
        assert_eq!(config.scheduler.args, parsed.scheduler.args);
        assert_eq!(config.suite.temp_prefix, parsed.suite.temp_prefix);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = TestkitConfig::from_file("/nonexistent/path/oasis-testkit.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OasisError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
