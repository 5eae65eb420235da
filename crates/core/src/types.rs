//! 도메인 타입 — 레지스트리 조회에 사용되는 이미지 참조
//!
//! [`Image`]는 저장소 경로, 태그, 그리고 선택적으로 미리 고정된 다이제스트를
//! 담습니다. 다이제스트는 불투명한 문자열이며 형식을 검증하지 않습니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// 태그가 생략된 참조에 사용되는 기본 태그
pub const DEFAULT_TAG: &str = "latest";

/// 이미지 참조
///
/// `digest`가 비어 있지 않으면 레지스트리 조회 없이 그대로 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    /// 저장소 경로 (예: `"myapp"`, `"localhost:5000/team/app"`)
    pub path: String,
    /// 태그 (예: `"latest"`)
    pub tag: String,
    /// 미리 고정된 다이제스트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl Image {
    /// 다이제스트 없이 경로와 태그로 참조를 생성합니다.
    pub fn new(path: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tag: tag.into(),
            digest: None,
        }
    }

    /// 다이제스트가 고정된 참조를 생성합니다.
    pub fn pinned(
        path: impl Into<String>,
        tag: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            tag: tag.into(),
            digest: Some(digest.into()),
        }
    }

    /// `path[:tag][@digest]` 형식의 참조를 파싱합니다.
    ///
    /// 태그 구분자 `:`는 마지막 `/` 이후에 있을 때만 인정되므로
    /// `localhost:5000/app`의 포트는 경로의 일부로 남습니다.
    /// 태그가 없으면 [`DEFAULT_TAG`]를 사용합니다.
    pub fn parse(reference: &str) -> Result<Self, RegistryError> {
        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                if digest.is_empty() {
                    return Err(RegistryError::empty("digest"));
                }
                (name, Some(digest.to_owned()))
            }
            None => (reference, None),
        };

        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (path, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &name[split + 1..];
                if tag.is_empty() {
                    return Err(RegistryError::empty("tag"));
                }
                (&name[..split], tag)
            }
            None => (name, DEFAULT_TAG),
        };

        if path.is_empty() {
            return Err(RegistryError::empty("repository"));
        }

        Ok(Self {
            path: path.to_owned(),
            tag: tag.to_owned(),
            digest,
        })
    }

    /// 고정된 다이제스트를 반환합니다. 빈 문자열은 고정되지 않은 것으로 봅니다.
    pub fn pinned_digest(&self) -> Option<&str> {
        self.digest.as_deref().filter(|d| !d.is_empty())
    }

    /// 비어 있지 않은 다이제스트가 고정되어 있는지 확인합니다.
    pub fn has_digest(&self) -> bool {
        self.pinned_digest().is_some()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.tag)?;
        if let Some(digest) = self.pinned_digest() {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
