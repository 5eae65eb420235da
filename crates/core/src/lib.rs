//! Oasis 테스트킷 공통 크레이트
//!
//! 레지스트리 mock과 fixture 하네스가 공유하는 에러 분류, 설정,
//! 이미지 참조 타입, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, FixtureError, OasisError, RegistryError};

// 설정
pub use config::TestkitConfig;

// 도메인 타입
pub use types::Image;
