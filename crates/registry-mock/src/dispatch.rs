//! Routing between the installed mock and the real network source.
//!
//! [`Registry`] wraps whatever network-backed [`Source`] production code
//! uses. Every call first checks the process-wide mock slot; when a mock is
//! installed the call is served from it, otherwise it goes to the wrapped
//! source. This keeps call sites unchanged for code that cannot take an
//! injected `Source`.

use oasis_core::error::RegistryError;
use oasis_core::types::Image;
use tracing::trace;

use crate::mock;
use crate::source::Source;

/// `Source` that prefers the process-wide mock over the network.
#[derive(Debug, Clone, Default)]
pub struct Registry<S> {
    network: S,
}

impl<S: Source> Registry<S> {
    /// Wraps the network source used when no mock is installed.
    pub fn new(network: S) -> Self {
        Self { network }
    }

    /// Returns the wrapped network source.
    pub fn network(&self) -> &S {
        &self.network
    }
}

impl<S: Source> Source for Registry<S> {
    async fn digest(&self, image: &Image) -> Result<String, RegistryError> {
        match mock::installed() {
            Some(mock) => {
                trace!(image = %image, "digest served by installed mock");
                mock.digest(image).await
            }
            None => self.network.digest(image).await,
        }
    }

    async fn tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        match mock::installed() {
            Some(mock) => {
                trace!(repository, "tags served by installed mock");
                mock.tags(repository).await
            }
            None => self.network.tags(repository).await,
        }
    }
}
