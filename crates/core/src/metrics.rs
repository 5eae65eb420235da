//! 메트릭 상수 및 설명 등록
//!
//! fixture 하네스와 레지스트리 mock이 기록하는 메트릭의 이름과 설명을
//! 중앙에서 정의합니다. recorder가 설치되지 않은 경우 기록은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `oasis_`
//! - 모듈명: `fixture_`, `registry_mock_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use oasis_core::metrics as m;
//!
//! metrics::counter!(m::FIXTURE_SETUPS_TOTAL, m::LABEL_FIXTURE => "scratch-storage").increment(1);
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// fixture 종류 레이블 키 (scratch-storage, background-scheduler-server, registry)
pub const LABEL_FIXTURE: &str = "fixture";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Fixture 하네스 메트릭 ──────────────────────────────────────────

/// Fixture: 테스트별 fixture 준비 횟수 (counter, label: fixture, result)
pub const FIXTURE_SETUPS_TOTAL: &str = "oasis_fixture_setups_total";

/// Fixture: 테스트별 fixture 정리 횟수 (counter, label: fixture, result)
pub const FIXTURE_TEARDOWNS_TOTAL: &str = "oasis_fixture_teardowns_total";

/// Fixture: 실행된 테스트 본문 수 (counter, label: result)
pub const FIXTURE_TESTS_TOTAL: &str = "oasis_fixture_tests_total";

/// Fixture: 백그라운드 프로세스 준비 대기 시간 (histogram, 초)
pub const FIXTURE_BACKGROUND_READY_SECONDS: &str = "oasis_fixture_background_ready_seconds";

// ─── Registry Mock 메트릭 ──────────────────────────────────────────

/// Registry Mock: 다이제스트/태그 조회 수 (counter, label: result)
pub const REGISTRY_MOCK_LOOKUPS_TOTAL: &str = "oasis_registry_mock_lookups_total";

/// Registry Mock: 프로세스 전역 mock 설치 여부 (gauge, 0 또는 1)
pub const REGISTRY_MOCK_INSTALLED: &str = "oasis_registry_mock_installed";

/// 모든 메트릭의 설명을 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다. recorder가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    describe_counter!(
        FIXTURE_SETUPS_TOTAL,
        "Total number of per-test fixture provisioning steps"
    );
    describe_counter!(
        FIXTURE_TEARDOWNS_TOTAL,
        "Total number of per-test fixture teardown steps"
    );
    describe_counter!(
        FIXTURE_TESTS_TOTAL,
        "Total number of test bodies run under the fixture harness"
    );
    describe_histogram!(
        FIXTURE_BACKGROUND_READY_SECONDS,
        "Time spent waiting for a background process to report readiness"
    );
    describe_counter!(
        REGISTRY_MOCK_LOOKUPS_TOTAL,
        "Total number of digest and tag lookups served by the registry mock"
    );
    describe_gauge!(
        REGISTRY_MOCK_INSTALLED,
        "Whether a registry mock is installed process-wide (1) or not (0)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        FIXTURE_SETUPS_TOTAL,
        FIXTURE_TEARDOWNS_TOTAL,
        FIXTURE_TESTS_TOTAL,
        FIXTURE_BACKGROUND_READY_SECONDS,
        REGISTRY_MOCK_LOOKUPS_TOTAL,
        REGISTRY_MOCK_INSTALLED,
    ];

    #[test]
    fn all_metrics_start_with_oasis_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("oasis_"),
                "Metric '{}' does not start with 'oasis_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in [
            FIXTURE_SETUPS_TOTAL,
            FIXTURE_TEARDOWNS_TOTAL,
            FIXTURE_TESTS_TOTAL,
            REGISTRY_MOCK_LOOKUPS_TOTAL,
        ] {
            assert!(name.ends_with("_total"), "counter '{name}' needs _total");
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_FIXTURE, LABEL_RESULT] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}
