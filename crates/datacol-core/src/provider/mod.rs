//! Provider capability
//!
//! Everything cloud-specific the CLI needs: issuing a service account key,
//! provisioning and destroying a stack, and finding a running pod for an app.
//! The lifecycle workflows and the exec bridge depend only on the
//! [`Provider`] trait; [`build`] picks the backend named in the config.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{Config, Paths, ProviderKind};
use crate::error::Result;
use crate::registry::Stack;

pub mod gcp;

pub use gcp::GcloudProvider;

/// Result of issuing stack credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialGrant {
    /// Service account key file contents
    pub credential: Vec<u8>,
    pub project_id: String,
    pub project_number: String,
    pub service_account_email: String,
}

/// Where a provisioned stack's controller listens, and its API password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEndpoint {
    pub host: String,
    pub password: String,
}

/// Fully resolved provisioning options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitOptions {
    pub name: String,
    pub cluster_name: String,
    /// False when the operator pointed at a cluster that already exists
    pub cluster_not_exists: bool,
    pub disk_size: u32,
    pub num_nodes: u32,
    pub machine_type: String,
    pub zone: String,
    pub bucket: String,
    pub preemptible: bool,
    /// CLI version doing the install
    pub version: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub cluster_version: String,
    pub project: String,
    pub project_number: String,
    pub sa_email: String,
}

/// Cloud backend operations consumed by the core
#[async_trait]
pub trait Provider: Send + Sync {
    /// Issue a service account key for stack `name`
    async fn create_credential(&self, name: &str, opt_out: bool) -> Result<CredentialGrant>;

    /// Provision cluster, storage and networking for a stack
    async fn initialize_stack(&self, options: &InitOptions) -> Result<StackEndpoint>;

    /// Destroy everything [`initialize_stack`](Provider::initialize_stack) created
    async fn teardown_stack(&self, name: &str, project: &str, bucket: &str) -> Result<()>;

    /// Identifier of a running pod for `app`
    async fn get_running_pods(&self, app: &str) -> Result<String>;
}

/// Which stack a provider instance acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    pub stack: String,
    pub zone: String,
    /// Known once the stack exists; resolved from the SDK during init
    pub project: Option<String>,
}

impl ProviderContext {
    /// Context for a stack that is about to be created
    pub fn bootstrap(stack: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            zone: zone.into(),
            project: None,
        }
    }

    /// Context for a registered stack
    pub fn from_stack(stack: &Stack) -> Self {
        Self {
            stack: stack.name.clone(),
            zone: stack.zone.clone(),
            project: Some(stack.project_id.clone()),
        }
    }
}

/// Build the provider backend selected by `config`
pub fn build(config: &Config, paths: &Paths, context: ProviderContext) -> Box<dyn Provider> {
    match config.provider {
        ProviderKind::Gcp => Box::new(GcloudProvider::new(config, paths.clone(), context)),
    }
}

/// Lowercase, dash-separated form of `value` safe for resource names
///
/// ```rust
/// assert_eq!(datacol_core::provider::slug("My_Project.1"), "my-project-1");
/// ```
pub fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
