//! In-memory registry mock.
//!
//! [`MockedRegistry`] maps repository paths to `tag -> digest` tables. It can
//! be handed directly to code that is generic over [`Source`], or installed
//! process-wide with [`install`] so that every [`Registry`](crate::Registry)
//! routes to it until [`uninstall`] is called.
//!
//! A repository entry exists iff at least one tag was registered for it.
//! Digests are opaque strings; only emptiness is checked.
//!
//! # Process-wide slot
//!
//! Exactly one mock may be installed at a time. `install` replaces any
//! previous mock (no stacking) and `uninstall` clears the slot
//! unconditionally. Tests that touch the slot must not run in parallel with
//! each other; mark them `#[serial]`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock as SlotLock};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use oasis_core::error::RegistryError;
use oasis_core::metrics as m;
use oasis_core::types::Image;

use crate::source::Source;

/// `tag -> digest` table of a single repository.
type MockedRepo = HashMap<String, String>;

static MOCKED_SOURCE: SlotLock<Option<Arc<MockedRegistry>>> = SlotLock::new(None);

/// Creates a new, empty mock and makes it the process-wide active source.
///
/// Any previously installed mock is replaced. The returned handle is used
/// to register tags; it stays valid after [`uninstall`] but is no longer
/// consulted by [`Registry`](crate::Registry).
pub fn install() -> Arc<MockedRegistry> {
    let mock = Arc::new(MockedRegistry::new());
    let previous = MOCKED_SOURCE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(Arc::clone(&mock));

    metrics::gauge!(m::REGISTRY_MOCK_INSTALLED).set(1.0);
    info!(replaced = previous.is_some(), "registry mock installed");
    mock
}

/// Clears the process-wide active source; subsequent lookups use the network.
///
/// Idempotent: calling it with nothing installed is a no-op.
pub fn uninstall() {
    let previous = MOCKED_SOURCE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    metrics::gauge!(m::REGISTRY_MOCK_INSTALLED).set(0.0);
    if previous.is_some() {
        info!("registry mock uninstalled");
    }
}

/// Returns the currently installed mock, if any.
pub fn installed() -> Option<Arc<MockedRegistry>> {
    MOCKED_SOURCE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Returns `true` if a mock is installed process-wide.
pub fn is_installed() -> bool {
    MOCKED_SOURCE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

/// In-memory registry holding canned `repository -> tag -> digest` data.
#[derive(Debug, Default)]
pub struct MockedRegistry {
    entries: RwLock<HashMap<String, MockedRepo>>,
}

/// Seed file layout: one table per repository, `tag = "digest"` pairs inside.
///
/// ```toml
/// [myapp]
/// latest = "sha256:aaaa"
/// "1.0" = "sha256:bbbb"
/// ```
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct SeedFile {
    repositories: HashMap<String, HashMap<String, String>>,
}

impl MockedRegistry {
    /// Creates an empty mock that is not installed anywhere.
    ///
    /// Use this when the code under test takes its `Source` by injection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `digest` for `(repository, tag)`, overwriting any previous value.
    ///
    /// The repository entry is created on first use.
    ///
    /// # Errors
    ///
    /// `RegistryError::InvalidArgument` if any argument is empty; nothing is
    /// registered in that case.
    pub async fn register_tag(
        &self,
        repository: &str,
        tag: &str,
        digest: &str,
    ) -> Result<(), RegistryError> {
        validate_triple(repository, tag, digest)?;

        let mut entries = self.entries.write().await;
        let previous = entries
            .entry(repository.to_owned())
            .or_default()
            .insert(tag.to_owned(), digest.to_owned());

        debug!(
            repository,
            tag,
            digest,
            overwritten = previous.is_some(),
            "registered mock tag"
        );
        Ok(())
    }

    /// Registers every `[repository] tag = "digest"` entry of a TOML document.
    ///
    /// All entries are validated before any is applied, so a bad seed
    /// leaves the mock unchanged. Returns the number of tags registered.
    pub async fn seed_from_toml(&self, toml_str: &str) -> Result<usize, RegistryError> {
        let seed: SeedFile =
            toml::from_str(toml_str).map_err(|e| RegistryError::InvalidArgument {
                field: "seed".to_owned(),
                reason: e.to_string(),
            })?;

        for (repository, tags) in &seed.repositories {
            for (tag, digest) in tags {
                validate_triple(repository, tag, digest)?;
            }
        }

        let mut entries = self.entries.write().await;
        let mut count = 0;
        for (repository, tags) in seed.repositories {
            if tags.is_empty() {
                continue;
            }
            count += tags.len();
            entries.entry(repository).or_default().extend(tags);
        }

        debug!(count, "seeded mock registry");
        Ok(count)
    }

    /// Number of repositories with at least one registered tag.
    pub async fn repository_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn validate_triple(repository: &str, tag: &str, digest: &str) -> Result<(), RegistryError> {
    if repository.is_empty() {
        return Err(RegistryError::empty("repository"));
    }
    if tag.is_empty() {
        return Err(RegistryError::empty("tag"));
    }
    if digest.is_empty() {
        return Err(RegistryError::empty("digest"));
    }
    Ok(())
}

fn record_lookup<T>(result: &Result<T, RegistryError>) {
    let outcome = if result.is_ok() { "success" } else { "failure" };
    metrics::counter!(m::REGISTRY_MOCK_LOOKUPS_TOTAL, m::LABEL_RESULT => outcome).increment(1);
}

impl Source for MockedRegistry {
    async fn digest(&self, image: &Image) -> Result<String, RegistryError> {
        if let Some(digest) = image.pinned_digest() {
            return Ok(digest.to_owned());
        }

        let result = {
            let entries = self.entries.read().await;
            match entries.get(&image.path) {
                None => Err(RegistryError::RepositoryNotFound(image.path.clone())),
                Some(repo) => repo.get(&image.tag).cloned().ok_or_else(|| {
                    RegistryError::TagNotFound {
                        repository: image.path.clone(),
                        tag: image.tag.clone(),
                    }
                }),
            }
        };

        record_lookup(&result);
        debug!(image = %image, found = result.is_ok(), "mock digest lookup");
        result
    }

    async fn tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        let result = self
            .entries
            .read()
            .await
            .get(repository)
            .map(|repo| repo.keys().cloned().collect())
            .ok_or_else(|| RegistryError::RepositoryNotFound(repository.to_owned()));

        record_lookup(&result);
        debug!(repository, found = result.is_ok(), "mock tags lookup");
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serial_test::serial;

    use super::*;

    #[tokio::test]
    async fn register_then_resolve_returns_digest() {
        let mock = MockedRegistry::new();
        mock.register_tag("myapp", "v1", "sha256:aaaa").await.unwrap();

        let digest = mock.digest(&Image::new("myapp", "v1")).await.unwrap();
        assert_eq!(digest, "sha256:aaaa");
    }

    #[tokio::test]
    async fn register_rejects_each_empty_field() {
        let mock = MockedRegistry::new();

        for (repo, tag, digest, field) in [
            ("", "v1", "d", "repository"),
            ("app", "", "d", "tag"),
            ("app", "v1", "", "digest"),
        ] {
            let err = mock.register_tag(repo, tag, digest).await.unwrap_err();
            assert_eq!(err, RegistryError::empty(field));
        }

        assert_eq!(mock.repository_count().await, 0);
    }

    #[tokio::test]
    async fn failed_register_leaves_existing_state_untouched() {
        let mock = MockedRegistry::new();
        mock.register_tag("app", "v1", "d1").await.unwrap();
        assert!(mock.register_tag("app", "v1", "").await.is_err());

        assert_eq!(mock.digest(&Image::new("app", "v1")).await.unwrap(), "d1");
    }

    #[tokio::test]
    async fn last_write_wins() {
        let mock = MockedRegistry::new();
        mock.register_tag("app", "latest", "d1").await.unwrap();
        mock.register_tag("app", "latest", "d2").await.unwrap();

        assert_eq!(
            mock.digest(&Image::new("app", "latest")).await.unwrap(),
            "d2"
        );
        assert_eq!(mock.tags("app").await.unwrap(), vec!["latest"]);
    }

    #[tokio::test]
    async fn pinned_digest_passes_through() {
        let mock = MockedRegistry::new();
        mock.register_tag("app", "v1", "registered").await.unwrap();

        // 등록된 값보다 고정된 값이 우선
        let pinned = Image::pinned("app", "v1", "pinned");
        assert_eq!(mock.digest(&pinned).await.unwrap(), "pinned");

        // 등록되지 않은 저장소도 그대로 통과
        let unknown = Image::pinned("never-registered", "x", "sha256:ff");
        assert_eq!(mock.digest(&unknown).await.unwrap(), "sha256:ff");
    }

    #[tokio::test]
    async fn empty_pinned_digest_falls_back_to_lookup() {
        let mock = MockedRegistry::new();
        mock.register_tag("app", "v1", "registered").await.unwrap();

        let image = Image::pinned("app", "v1", "");
        assert_eq!(mock.digest(&image).await.unwrap(), "registered");
    }

    #[tokio::test]
    async fn unknown_repository_is_not_found() {
        let mock = MockedRegistry::new();

        let err = mock.digest(&Image::new("ghost", "v1")).await.unwrap_err();
        assert_eq!(err, RegistryError::RepositoryNotFound("ghost".to_owned()));

        let err = mock.tags("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unknown_tag_is_not_found() {
        let mock = MockedRegistry::new();
        mock.register_tag("app", "v1", "d").await.unwrap();

        let err = mock.digest(&Image::new("app", "v2")).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::TagNotFound {
                repository: "app".to_owned(),
                tag: "v2".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn tags_returns_registered_set() {
        let mock = MockedRegistry::new();
        mock.register_tag("app", "v1", "d1").await.unwrap();
        mock.register_tag("app", "v2", "d2").await.unwrap();
        mock.register_tag("other", "v9", "d9").await.unwrap();

        let tags: HashSet<String> = mock.tags("app").await.unwrap().into_iter().collect();
        let expected: HashSet<String> = ["v1", "v2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tags, expected);
    }

    #[tokio::test]
    async fn seed_from_toml_registers_all_entries() {
        let mock = MockedRegistry::new();
        let count = mock
            .seed_from_toml(
                r#"
[myapp]
latest = "sha256:aaaa"
"1.0" = "sha256:bbbb"

["team/worker"]
stable = "sha256:cccc"
"#,
            )
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(mock.repository_count().await, 2);
        assert_eq!(
            mock.digest(&Image::new("team/worker", "stable"))
                .await
                .unwrap(),
            "sha256:cccc"
        );
    }

    #[tokio::test]
    async fn seed_with_empty_digest_registers_nothing() {
        let mock = MockedRegistry::new();
        let err = mock
            .seed_from_toml("[a]\nv1 = \"d\"\n\n[b]\nv1 = \"\"\n")
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidArgument { .. }));
        assert_eq!(mock.repository_count().await, 0);
    }

    #[tokio::test]
    async fn seed_skips_repositories_without_tags() {
        let mock = MockedRegistry::new();
        let count = mock.seed_from_toml("[empty]\n").await.unwrap();
        assert_eq!(count, 0);
        assert!(mock.tags("empty").await.is_err());
    }

    #[tokio::test]
    async fn seed_rejects_malformed_toml() {
        let mock = MockedRegistry::new();
        let err = mock.seed_from_toml("[app\nv1 = ").await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidArgument { ref field, .. } if field == "seed"
        ));
    }

    #[test]
    #[serial]
    fn install_replaces_previous_mock() {
        let first = install();
        let second = install();

        let active = installed().expect("a mock should be installed");
        assert!(Arc::ptr_eq(&active, &second));
        assert!(!Arc::ptr_eq(&active, &first));

        uninstall();
        assert!(!is_installed());
    }

    #[test]
    #[serial]
    fn uninstall_is_idempotent() {
        uninstall();
        uninstall();
        assert!(installed().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn handle_keeps_data_after_uninstall() {
        let mock = install();
        mock.register_tag("app", "v1", "d").await.unwrap();
        uninstall();

        assert!(!is_installed());
        assert_eq!(mock.digest(&Image::new("app", "v1")).await.unwrap(), "d");
    }

    #[test]
    fn mocked_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockedRegistry>();
    }
}
