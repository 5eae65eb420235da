//! In-memory stand-in for the container registry.
//!
//! # Module Structure
//!
//! - [`source`]: The `Source` capability shared by the real client and the mock
//! - [`mock`]: `MockedRegistry` and the process-wide install/uninstall slot
//! - [`dispatch`]: `Registry<S>`, routing calls to the installed mock or the network
//!
//! # Usage
//!
//! Prefer injecting the mock directly:
//!
//! ```ignore
//! let mock = Arc::new(MockedRegistry::new());
//! mock.register_tag("myapp", "latest", "sha256:1234").await?;
//! let deployer = Deployer::new(Arc::clone(&mock));
//! ```
//!
//! Call sites that hold a `Registry<NetworkClient>` can be redirected
//! without changes:
//!
//! ```ignore
//! let mock = oasis_registry_mock::install();
//! mock.register_tag("myapp", "latest", "sha256:1234").await?;
//! // ... code under test ...
//! oasis_registry_mock::uninstall();
//! ```

pub mod dispatch;
pub mod mock;
pub mod source;

pub use dispatch::Registry;
pub use mock::{MockedRegistry, install, installed, is_installed, uninstall};
pub use source::Source;

pub use oasis_core::error::RegistryError;
pub use oasis_core::types::Image;
