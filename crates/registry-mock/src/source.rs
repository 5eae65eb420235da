//! Registry lookup abstraction.
//!
//! The [`Source`] trait is the narrow capability the orchestration code uses
//! to turn tags into content digests. The real network client and
//! [`MockedRegistry`](crate::MockedRegistry) both implement it, so code under
//! test cannot tell them apart.
//!
//! ```text
//!   ┌──────────────┐
//!   │ code under   │
//!   │    test      │
//!   └──────┬───────┘
//!          ▼
//!     ┌─────────┐
//!     │ Source  │ (trait)
//!     └─────────┘
//!       │     │
//!       ▼     ▼
//!  ┌───────┐ ┌──────┐
//!  │network│ │ Mock │
//!  └───────┘ └──────┘
//! ```

use std::future::Future;
use std::sync::Arc;

use oasis_core::error::RegistryError;
use oasis_core::types::Image;

/// Trait abstracting registry lookups.
///
/// The trait is `Send + Sync + 'static`, allowing safe sharing across async contexts.
///
/// # Error Handling
///
/// - Unknown repository: `RegistryError::RepositoryNotFound`
/// - Unknown tag: `RegistryError::TagNotFound`
/// - Transport failures (network sources only): `RegistryError::Unavailable`
pub trait Source: Send + Sync + 'static {
    /// Resolves the content digest an image reference points to.
    ///
    /// An image that already carries a non-empty digest is returned as-is
    /// without any lookup.
    fn digest(&self, image: &Image) -> impl Future<Output = Result<String, RegistryError>> + Send;

    /// Lists the tags known for a repository.
    ///
    /// Order is unspecified; callers must not depend on it.
    fn tags(
        &self,
        repository: &str,
    ) -> impl Future<Output = Result<Vec<String>, RegistryError>> + Send;
}

impl<S: Source> Source for Arc<S> {
    fn digest(&self, image: &Image) -> impl Future<Output = Result<String, RegistryError>> + Send {
        S::digest(self, image)
    }

    fn tags(
        &self,
        repository: &str,
    ) -> impl Future<Output = Result<Vec<String>, RegistryError>> + Send {
        S::tags(self, repository)
    }
}
