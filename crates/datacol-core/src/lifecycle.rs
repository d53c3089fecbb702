//! Stack lifecycle workflows
//!
//! Init and teardown are the only multi-step, side-effecting operations in
//! the CLI. Both keep local state a conservative cache of remote truth:
//!
//! - init writes the [`Stack`] and [`Auth`] records only after provisioning
//!   succeeded
//! - teardown deletes local records only after the remote destroy succeeded
//!
//! Init is split around the operator confirmation gate.
//! [`StackLifecycle::begin_init`] issues credentials and resolves defaults,
//! then hands back a [`PendingInit`] that the caller shows to the operator.
//! Only a [`ConfirmedInit`] (from [`PendingInit::confirm`]) can be passed to
//! [`StackLifecycle::complete_init`].
//!
//! ```text
//! Start -> CredentialIssued -> ApisConfirmed -> Provisioned -> Persisted -> Done
//!          (begin_init)        (confirm)        (complete_init ..........)
//! ```
//!
//! Teardown runs `Start -> AuthLoaded -> RemoteDestroyed -> LocalCleared -> Done`.
//!
//! Saved credential files are not rolled back when a later init step fails;
//! re-running init overwrites them.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::Paths;
use crate::error::{CoreError, Result};
use crate::provider::gcp::default_cluster_name;
use crate::provider::{Provider, StackEndpoint, slug};
use crate::registry::{Auth, Stack, StackRegistry, validate_stack_name};

pub use crate::provider::InitOptions;

/// Cloud APIs the operator must enable before provisioning
pub const REQUIRED_APIS: &[&str] = &[
    "datastore.googleapis.com",
    "cloudbuild.googleapis.com",
    "deploymentmanager",
    "iam.googleapis.com",
];

/// Init workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Start,
    CredentialIssued,
    ApisConfirmed,
    Provisioned,
    Persisted,
    Done,
}

/// Teardown workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownState {
    Start,
    AuthLoaded,
    RemoteDestroyed,
    LocalCleared,
    Done,
}

/// Operator input for `datacol init`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitRequest {
    pub name: String,
    pub zone: String,
    /// Defaults to `datacol-<project slug>`
    pub bucket: Option<String>,
    pub num_nodes: u32,
    /// Existing cluster to use; defaults to a new `<name>-cluster`
    pub cluster_name: Option<String>,
    pub disk_size: u32,
    pub machine_type: String,
    pub preemptible: bool,
    /// Opt out of update emails
    pub opt_out: bool,
    /// API password; generated by the provider when unset
    pub api_key: Option<String>,
    pub cluster_version: String,
    /// CLI version doing the install
    pub version: String,
}

impl Default for InitRequest {
    fn default() -> Self {
        Self {
            name: "demo".to_string(),
            zone: "us-east1-b".to_string(),
            bucket: None,
            num_nodes: 2,
            cluster_name: None,
            disk_size: 10,
            machine_type: "n1-standard-1".to_string(),
            preemptible: true,
            opt_out: false,
            api_key: None,
            cluster_version: "1.6.4".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Init that has issued credentials and waits for operator confirmation
#[derive(Debug)]
pub struct PendingInit {
    options: InitOptions,
    service_key: Vec<u8>,
}

impl PendingInit {
    pub fn state(&self) -> InitState {
        InitState::CredentialIssued
    }

    /// Resolved provisioning options
    pub fn options(&self) -> &InitOptions {
        &self.options
    }

    /// Console link enabling [`REQUIRED_APIS`] for the stack's project
    pub fn enable_apis_url(&self) -> String {
        format!(
            "https://console.cloud.google.com/flows/enableapi?apiid={}&project={}",
            REQUIRED_APIS.join(","),
            self.options.project
        )
    }

    /// Text to show the operator before asking for confirmation
    pub fn instructions(&self) -> String {
        format!(
            "Datacol talks to several {} APIs on behalf of project {}. \
             Enable them by opening the following link in a browser, then continue:\n{}",
            "Google Cloud",
            self.options.project,
            self.enable_apis_url()
        )
    }

    /// The operator enabled the APIs; provisioning may proceed
    pub fn confirm(self) -> ConfirmedInit {
        debug!("Stack {} APIs confirmed", self.options.name);
        ConfirmedInit {
            options: self.options,
            service_key: self.service_key,
        }
    }

    /// The operator backed out; nothing beyond the credential file was written
    pub fn decline(self) -> CoreError {
        CoreError::InitDeclined {
            stack: self.options.name,
        }
    }
}

/// Init past the confirmation gate
#[derive(Debug)]
pub struct ConfirmedInit {
    options: InitOptions,
    service_key: Vec<u8>,
}

impl ConfirmedInit {
    pub fn state(&self) -> InitState {
        InitState::ApisConfirmed
    }

    pub fn options(&self) -> &InitOptions {
        &self.options
    }
}

/// Records committed by a successful init
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub stack: Stack,
    pub auth: Auth,
    pub endpoint: StackEndpoint,
}

/// Result of a teardown whose remote destroy succeeded
#[derive(Debug)]
pub struct TeardownOutcome {
    pub stack: String,
    /// Local cleanup steps that failed; the remote side is already gone
    pub cleanup_errors: Vec<CoreError>,
}

impl TeardownOutcome {
    pub fn is_clean(&self) -> bool {
        self.cleanup_errors.is_empty()
    }
}

/// Drives init and teardown against a provider and the local registry
pub struct StackLifecycle<'a> {
    provider: &'a dyn Provider,
    registry: StackRegistry<'a>,
    paths: &'a Paths,
}

impl<'a> StackLifecycle<'a> {
    pub fn new(provider: &'a dyn Provider, registry: StackRegistry<'a>, paths: &'a Paths) -> Self {
        Self {
            provider,
            registry,
            paths,
        }
    }

    /// Issue credentials, save them, and resolve defaults
    ///
    /// Fails with [`CoreError::InvalidStackName`] before the provider is
    /// asked for anything. Fails with [`CoreError::Credential`] or
    /// [`CoreError::ProjectResolution`] before anything is written when the
    /// provider's answer is incomplete.
    pub async fn begin_init(&self, request: InitRequest) -> Result<PendingInit> {
        validate_stack_name(&request.name)?;
        debug!("Stack {} init: {:?}", request.name, InitState::Start);

        let grant = self
            .provider
            .create_credential(&request.name, request.opt_out)
            .await?;

        if grant.credential.is_empty() {
            return Err(CoreError::Credential {
                stack: request.name,
            });
        }
        if grant.project_id.is_empty() {
            return Err(CoreError::ProjectResolution {
                stack: request.name,
            });
        }

        let path = self.save_credential(&request.name, &grant.credential)?;
        debug!(
            "Stack {} init: {:?}, key saved at {}",
            request.name,
            InitState::CredentialIssued,
            path.display()
        );

        let bucket = request
            .bucket
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| default_bucket(&grant.project_id));
        let (cluster_name, cluster_not_exists) =
            match request.cluster_name.filter(|c| !c.is_empty()) {
                Some(existing) => (existing, false),
                None => (default_cluster_name(&request.name), true),
            };

        let options = InitOptions {
            name: request.name,
            cluster_name,
            cluster_not_exists,
            disk_size: request.disk_size,
            num_nodes: request.num_nodes,
            machine_type: request.machine_type,
            zone: request.zone,
            bucket,
            preemptible: request.preemptible,
            version: request.version,
            api_key: request.api_key,
            cluster_version: request.cluster_version,
            project: grant.project_id,
            project_number: grant.project_number,
            sa_email: grant.service_account_email,
        };

        Ok(PendingInit {
            options,
            service_key: grant.credential,
        })
    }

    /// Provision remotely, then commit the stack and auth records
    pub async fn complete_init(&self, confirmed: ConfirmedInit) -> Result<InitOutcome> {
        let ConfirmedInit {
            options,
            service_key,
        } = confirmed;

        info!(
            "Provisioning stack {} in project {}",
            options.name, options.project
        );
        let endpoint = self.provider.initialize_stack(&options).await?;
        debug!("Stack {} init: {:?}", options.name, InitState::Provisioned);

        let stack = Stack {
            name: options.name.clone(),
            project_id: options.project.clone(),
            zone: options.zone.clone(),
            bucket: options.bucket.clone(),
            service_key,
        };
        let auth = Auth {
            name: options.name.clone(),
            project: options.project.clone(),
            bucket: options.bucket.clone(),
            api_server: endpoint.host.clone(),
            api_key: endpoint.password.clone(),
        };

        self.registry.save_stack(&stack)?;
        self.registry.set_auth(&auth)?;
        self.registry.set_current_stack(&stack.name)?;
        debug!("Stack {} init: {:?}", stack.name, InitState::Persisted);

        info!("Stack {} is ready at {}", stack.name, endpoint.host);
        debug!("Stack {} init: {:?}", stack.name, InitState::Done);
        Ok(InitOutcome {
            stack,
            auth,
            endpoint,
        })
    }

    /// Destroy `stack` remotely, then clear its local records
    ///
    /// A missing auth record fails with [`CoreError::NotInitialized`]. A
    /// failed remote destroy leaves local state untouched so teardown can be
    /// retried. Once the remote destroy succeeded, local cleanup failures are
    /// collected in the outcome instead of failing the call.
    pub async fn teardown(&self, stack: &str) -> Result<TeardownOutcome> {
        validate_stack_name(stack)?;
        debug!("Stack {} teardown: {:?}", stack, TeardownState::Start);
        let auth = self.registry.load_auth(stack)?;
        debug!("Stack {} teardown: {:?}", stack, TeardownState::AuthLoaded);

        info!("Destroying stack {} in project {}", auth.name, auth.project);
        self.provider
            .teardown_stack(&auth.name, &auth.project, &auth.bucket)
            .await?;
        debug!("Stack {} teardown: {:?}", stack, TeardownState::RemoteDestroyed);

        let mut cleanup_errors = Vec::new();
        let mut record = |step: &str, result: Result<()>| {
            if let Err(e) = result {
                warn!("Stack {} cleanup step '{}' failed: {}", stack, step, e);
                cleanup_errors.push(e);
            }
        };

        record("delete auth", self.registry.delete_auth(stack).map(drop));
        record("delete stack", self.registry.delete_stack(stack).map(drop));
        record("clear current stack", self.registry.clear_current_stack(stack));
        record("remove config directory", self.remove_stack_dir(stack));

        debug!("Stack {} teardown: {:?}", stack, TeardownState::LocalCleared);
        info!("Stack {} destroyed", stack);
        debug!("Stack {} teardown: {:?}", stack, TeardownState::Done);
        Ok(TeardownOutcome {
            stack: stack.to_string(),
            cleanup_errors,
        })
    }

    fn save_credential(&self, stack: &str, credential: &[u8]) -> Result<PathBuf> {
        self.paths.ensure_stack_dir(stack)?;
        let path = self.paths.credential_file(stack);

        let mut options = fs::OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&path)
            .map_err(|e| CoreError::store_io(&path, e))?;
        file.write_all(credential)
            .and_then(|()| file.sync_all())
            .map_err(|e| CoreError::store_io(&path, e))?;

        Ok(path)
    }

    fn remove_stack_dir(&self, stack: &str) -> Result<()> {
        let dir = self.paths.stack_dir(stack);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::store_io(dir, e)),
        }
    }
}

/// Bucket name used when the operator does not pick one
pub fn default_bucket(project_id: &str) -> String {
    format!("datacol-{}", slug(project_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bucket() {
        assert_eq!(default_bucket("proj-1"), "datacol-proj-1");
        assert_eq!(default_bucket("Example.Project"), "datacol-example-project");
    }

    #[test]
    fn test_request_defaults() {
        let request = InitRequest::default();
        assert_eq!(request.name, "demo");
        assert_eq!(request.num_nodes, 2);
        assert!(request.preemptible);
        assert!(request.bucket.is_none());
    }
}
