//! 에러 타입 — 도메인별 에러 정의

/// Oasis 테스트킷 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum OasisError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 레지스트리 조회 에러
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// fixture 생명주기 에러
    #[error("fixture error: {0}")]
    Fixture(#[from] FixtureError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 레지스트리 `Source` 에러
///
/// 실제 네트워크 클라이언트와 mock이 동일한 에러를 반환하므로
/// 호출자는 두 경로를 구분할 수 없습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// 빈 저장소/태그/다이제스트 등 잘못된 인자
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 등록되지 않은 저장소
    #[error("path {0} not found")]
    RepositoryNotFound(String),

    /// 저장소에 등록되지 않은 태그
    #[error("tag {tag} not found for path {repository}")]
    TagNotFound { repository: String, tag: String },

    /// 네트워크 레지스트리에 접근할 수 없음
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    /// 빈 인자 에러를 생성합니다.
    pub fn empty(field: &str) -> Self {
        Self::InvalidArgument {
            field: field.to_owned(),
            reason: "must not be empty".to_owned(),
        }
    }

    /// 저장소 또는 태그를 찾지 못한 에러인지 확인합니다.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RepositoryNotFound(_) | Self::TagNotFound { .. })
    }
}

/// fixture 생명주기 에러
///
/// 디렉토리 생성/삭제, 프로세스 시작/정지 실패는 모두 치명적이며
/// 재시도하지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// 파일시스템 작업 실패
    #[error("filesystem operation failed at {path}: {reason}")]
    Filesystem { path: String, reason: String },

    /// 백그라운드 프로세스 시작/정지 실패
    #[error("process '{name}' failed: {reason}")]
    Process { name: String, reason: String },

    /// 잘못된 생명주기 전환
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}
