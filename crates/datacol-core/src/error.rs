//! Unified error handling for datacol-core
//!
//! Every failure the core can surface is one variant of [`CoreError`]. No
//! variant is retried anywhere in the crate; callers get the error with the
//! operation and stack name attached.
//!
//! # Example
//!
//! ```rust
//! use datacol_core::CoreError;
//!
//! let err = CoreError::NotInitialized { stack: "demo".to_string() };
//! assert!(err.is_not_initialized());
//! assert!(err.to_string().contains("create a stack first"));
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Core error type for stack, store and remote operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// No active stack or auth record; the user must run init first
    #[error("stack '{stack}' is not initialized, create a stack first with: datacol init")]
    NotInitialized { stack: String },

    /// Stack name is unusable as a cloud resource prefix or directory name
    #[error("invalid stack name '{name}': {reason}")]
    InvalidStackName { name: String, reason: &'static str },

    /// Provider returned an empty credential
    #[error("invalid credentials issued for stack '{stack}'")]
    Credential { stack: String },

    /// Provider returned no project id
    #[error("invalid project id issued for stack '{stack}'")]
    ProjectResolution { stack: String },

    /// A controller call failed; the remote message is passed through as-is
    #[error("{operation} failed for stack '{stack}': {message}")]
    RemoteCall {
        operation: &'static str,
        stack: String,
        message: String,
    },

    /// A provider capability call failed
    #[error("provider {operation} failed: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },

    /// Local store or config directory could not be read or written
    #[error("store I/O error at {}: {source}", path.display())]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded for, or decoded from, the store
    #[error("encoding error for {context}: {source}")]
    Encoding {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Another process holds the store lock
    #[error("state store {} is locked by another datacol process", path.display())]
    AlreadyLocked { path: PathBuf },

    /// An external tool could not be launched
    #[error("failed to launch '{program}': {source}")]
    Subprocess {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing relayed output to the caller's sink failed
    #[error("failed to write {context}: {source}")]
    Output {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The operator declined the confirmation gate during init
    #[error("init of stack '{stack}' was cancelled before provisioning")]
    InitDeclined { stack: String },

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub(crate) fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::StoreIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn provider(operation: &'static str, message: impl Into<String>) -> Self {
        CoreError::Provider {
            operation,
            message: message.into(),
        }
    }

    /// Returns true if the user has to run init before retrying
    #[must_use]
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, CoreError::NotInitialized { .. })
    }

    /// Returns true if the failure came from the remote controller
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, CoreError::RemoteCall { .. })
    }
}
