//! Remote controller access
//!
//! The [`Controller`] trait is the wire-level client for a stack's
//! controller; [`HttpController`] speaks its HTTP API. Callers go through
//! the [`Gateway`] facade, which tags failures with the operation and stack
//! name and implements the log streaming protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub mod gateway;
pub mod http;

pub use gateway::Gateway;
pub use http::HttpController;

/// App descriptor, passed through as the controller returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_id: Option<String>,
    /// Fields this client does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Environment variables of an app, ordered by key
pub type Environment = BTreeMap<String, String>;

/// Result of a one-shot process run through the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdResponse {
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Parameters of a log stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamRequest {
    pub name: String,
    /// How far back to start
    pub since: Duration,
    /// Keep the stream open for new output
    pub follow: bool,
}

/// Parameters of a one-shot process run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRunRequest {
    pub name: String,
    pub command: Vec<String>,
}

/// Failure reported by, or on the way to, the controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Receiving half of a server-streaming log call
#[async_trait]
pub trait LogStream: Send {
    /// Next log frame; `Ok(None)` is the clean end-of-stream signal
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, RemoteError>;

    /// Half-close: tell the controller this client is done sending
    async fn close_send(&mut self);
}

/// Wire-level controller client
#[async_trait]
pub trait Controller: Send + Sync {
    async fn app_list(&self) -> Result<Vec<App>, RemoteError>;
    async fn app_get(&self, name: &str) -> Result<App, RemoteError>;
    async fn app_create(&self, name: &str) -> Result<App, RemoteError>;
    async fn app_delete(&self, name: &str) -> Result<(), RemoteError>;
    async fn app_restart(&self, name: &str) -> Result<(), RemoteError>;
    async fn environment_get(&self, name: &str) -> Result<Environment, RemoteError>;
    async fn environment_set(&self, name: &str, data: &str) -> Result<(), RemoteError>;
    async fn log_stream(
        &self,
        request: &LogStreamRequest,
    ) -> Result<Box<dyn LogStream>, RemoteError>;
    async fn process_run(&self, request: &ProcessRunRequest) -> Result<CmdResponse, RemoteError>;
}
