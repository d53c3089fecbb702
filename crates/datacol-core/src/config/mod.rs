//! Configuration and on-disk layout for the datacol CLI
//!
//! This module provides:
//!
//! - [`Paths`] - the per-user root directory and everything stored under it
//! - [`Config`] - optional CLI settings read from `config.toml` in the root
//!
//! # Layout
//!
//! ```text
//! ~/.datacol/
//! ├── config.toml        # optional settings
//! ├── state.json         # local client state store
//! ├── state.lock         # store lock file
//! └── <stack>/
//!     ├── credentials.json
//!     └── kubeconfig
//! ```

#[allow(clippy::module_inception)]
pub mod config;
pub mod error;
pub mod paths;

pub use config::{Config, ProviderKind};
pub use error::{ConfigError, Result};
pub use paths::Paths;
