//! Google Cloud backend
//!
//! Drives the `gcloud`, `gsutil` and `kubectl` binaries rather than linking
//! an SDK. Every call is one child process with captured output; "already
//! exists" and "not found" answers are tolerated where re-running init or
//! teardown should converge instead of failing.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::fs;
use tracing::{debug, info};

use super::{CredentialGrant, InitOptions, Provider, ProviderContext, StackEndpoint, slug};
use crate::config::{Config, Paths};
use crate::error::{CoreError, Result};
use crate::process::{run_captured, run_checked};

const OWNER_ROLE: &str = "roles/owner";
const ALREADY_EXISTS: &[&str] = &["already exists", "ALREADY_EXISTS", "409"];
const NOT_FOUND: &[&str] = &["not found", "NOT_FOUND", "404", "BucketNotFound"];

/// Provider backed by the Google Cloud CLI tools
#[derive(Debug, Clone)]
pub struct GcloudProvider {
    cloud_tool: String,
    storage_tool: String,
    kube_tool: String,
    paths: Paths,
    context: ProviderContext,
}

impl GcloudProvider {
    pub fn new(config: &Config, paths: Paths, context: ProviderContext) -> Self {
        Self {
            cloud_tool: config.cloud_tool.clone(),
            storage_tool: config.storage_tool.clone(),
            kube_tool: config.exec_tool.clone(),
            paths,
            context,
        }
    }

    async fn resolve_project(&self) -> Result<String> {
        if let Some(project) = self.context.project.as_deref().filter(|p| !p.is_empty()) {
            return Ok(project.to_string());
        }

        let project = run_checked(
            "resolve project",
            &self.cloud_tool,
            ["config", "get-value", "project", "--quiet"],
            &[],
        )
        .await?;

        if project.is_empty() || project == "(unset)" {
            return Err(CoreError::ProjectResolution {
                stack: self.context.stack.clone(),
            });
        }
        Ok(project)
    }

    /// Run a step where some failures mean the work is already done
    async fn run_tolerant(
        &self,
        operation: &'static str,
        program: &str,
        args: Vec<String>,
        tolerated: &[&str],
    ) -> Result<()> {
        let output = run_captured(program, &args, &[]).await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if tolerated.iter().any(|marker| stderr.contains(marker)) {
            debug!("{} skipped: {}", operation, stderr.trim());
            return Ok(());
        }

        Err(CoreError::provider(
            operation,
            format!("{program} exited with {}: {}", output.status, stderr.trim()),
        ))
    }
}

#[async_trait]
impl Provider for GcloudProvider {
    async fn create_credential(&self, name: &str, opt_out: bool) -> Result<CredentialGrant> {
        let project = self.resolve_project().await?;
        let account_id = service_account_id(name);
        let email = service_account_email(&account_id, &project);
        debug!(
            "Issuing credentials for stack {} as {} (update emails opted out: {})",
            name, email, opt_out
        );

        self.run_tolerant(
            "create service account",
            &self.cloud_tool,
            vec![
                "iam".into(),
                "service-accounts".into(),
                "create".into(),
                account_id,
                format!("--display-name=datacol stack {name}"),
                format!("--project={project}"),
                "--quiet".into(),
            ],
            ALREADY_EXISTS,
        )
        .await?;

        run_checked(
            "grant service account role",
            &self.cloud_tool,
            [
                "projects".to_string(),
                "add-iam-policy-binding".to_string(),
                project.clone(),
                format!("--member=serviceAccount:{email}"),
                format!("--role={OWNER_ROLE}"),
                "--quiet".to_string(),
            ],
            &[],
        )
        .await?;

        let scratch = tempfile::TempDir::new().map_err(|e| CoreError::store_io("<tmp>", e))?;
        let key_path = scratch.path().join("key.json");
        run_checked(
            "create service account key",
            &self.cloud_tool,
            [
                OsStr::new("iam"),
                OsStr::new("service-accounts"),
                OsStr::new("keys"),
                OsStr::new("create"),
                key_path.as_os_str(),
                OsStr::new(&format!("--iam-account={email}")),
                OsStr::new(&format!("--project={project}")),
            ],
            &[],
        )
        .await?;
        let credential = fs::read(&key_path).map_err(|e| CoreError::store_io(&key_path, e))?;

        let project_number = run_checked(
            "describe project",
            &self.cloud_tool,
            [
                "projects",
                "describe",
                project.as_str(),
                "--format=value(projectNumber)",
            ],
            &[],
        )
        .await?;

        Ok(CredentialGrant {
            credential,
            project_id: project,
            project_number,
            service_account_email: email,
        })
    }

    async fn initialize_stack(&self, options: &InitOptions) -> Result<StackEndpoint> {
        if options.cluster_not_exists {
            info!("Creating cluster {} in {}", options.cluster_name, options.zone);
            run_checked(
                "create cluster",
                &self.cloud_tool,
                cluster_create_args(options),
                &[],
            )
            .await?;
        } else {
            info!("Using existing cluster {}", options.cluster_name);
        }

        info!("Creating bucket gs://{}", options.bucket);
        self.run_tolerant(
            "create bucket",
            &self.storage_tool,
            vec![
                "mb".into(),
                "-p".into(),
                options.project.clone(),
                format!("gs://{}", options.bucket),
            ],
            ALREADY_EXISTS,
        )
        .await?;

        self.paths.ensure_stack_dir(&options.name)?;
        let kubeconfig = self.paths.kubeconfig_file(&options.name);
        run_checked(
            "fetch cluster credentials",
            &self.cloud_tool,
            [
                "container".to_string(),
                "clusters".to_string(),
                "get-credentials".to_string(),
                options.cluster_name.clone(),
                format!("--zone={}", options.zone),
                format!("--project={}", options.project),
            ],
            &[("KUBECONFIG", kubeconfig.as_os_str())],
        )
        .await?;

        let host = run_checked(
            "describe cluster",
            &self.cloud_tool,
            [
                "container".to_string(),
                "clusters".to_string(),
                "describe".to_string(),
                options.cluster_name.clone(),
                format!("--zone={}", options.zone),
                format!("--project={}", options.project),
                "--format=value(endpoint)".to_string(),
            ],
            &[],
        )
        .await?;
        if host.is_empty() {
            return Err(CoreError::provider(
                "describe cluster",
                format!("cluster {} has no endpoint", options.cluster_name),
            ));
        }

        let password = options
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .unwrap_or_else(generate_password);

        Ok(StackEndpoint { host, password })
    }

    async fn teardown_stack(&self, name: &str, project: &str, bucket: &str) -> Result<()> {
        let cluster = default_cluster_name(name);
        info!("Deleting cluster {} in {}", cluster, self.context.zone);
        self.run_tolerant(
            "delete cluster",
            &self.cloud_tool,
            vec![
                "container".into(),
                "clusters".into(),
                "delete".into(),
                cluster,
                format!("--zone={}", self.context.zone),
                format!("--project={project}"),
                "--quiet".into(),
            ],
            NOT_FOUND,
        )
        .await?;

        info!("Deleting bucket gs://{}", bucket);
        self.run_tolerant(
            "delete bucket",
            &self.storage_tool,
            vec!["-m".into(), "rm".into(), "-r".into(), format!("gs://{bucket}")],
            NOT_FOUND,
        )
        .await?;

        let email = service_account_email(&service_account_id(name), project);
        self.run_tolerant(
            "delete service account",
            &self.cloud_tool,
            vec![
                "iam".into(),
                "service-accounts".into(),
                "delete".into(),
                email,
                format!("--project={project}"),
                "--quiet".into(),
            ],
            NOT_FOUND,
        )
        .await
    }

    async fn get_running_pods(&self, app: &str) -> Result<String> {
        let kubeconfig = self.paths.kubeconfig_file(&self.context.stack);
        let names = run_checked(
            "get running pods",
            &self.kube_tool,
            running_pods_args(&kubeconfig.to_string_lossy(), &self.context.stack, app),
            &[],
        )
        .await?;

        names
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| {
                CoreError::provider("get running pods", format!("no running pods for app {app}"))
            })
    }
}

/// Cluster name used when the operator does not name an existing one
pub fn default_cluster_name(stack: &str) -> String {
    format!("{stack}-cluster")
}

/// Service account ids are 6-30 characters of `[a-z0-9-]`
fn service_account_id(stack: &str) -> String {
    let mut id = format!("datacol-{}", slug(stack));
    id.truncate(30);
    id.trim_end_matches('-').to_string()
}

fn service_account_email(account_id: &str, project: &str) -> String {
    format!("{account_id}@{project}.iam.gserviceaccount.com")
}

fn generate_password() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn cluster_create_args(options: &InitOptions) -> Vec<String> {
    let mut args = vec![
        "container".to_string(),
        "clusters".to_string(),
        "create".to_string(),
        options.cluster_name.clone(),
        format!("--zone={}", options.zone),
        format!("--project={}", options.project),
        format!("--num-nodes={}", options.num_nodes),
        format!("--machine-type={}", options.machine_type),
        format!("--disk-size={}", options.disk_size),
        format!("--cluster-version={}", options.cluster_version),
        format!("--labels=datacol-stack={}", slug(&options.name)),
        "--quiet".to_string(),
    ];
    if options.preemptible {
        args.push("--preemptible".to_string());
    }
    args
}

fn running_pods_args(kubeconfig: &str, namespace: &str, app: &str) -> Vec<String> {
    vec![
        "--kubeconfig".to_string(),
        kubeconfig.to_string(),
        "-n".to_string(),
        namespace.to_string(),
        "get".to_string(),
        "pods".to_string(),
        format!("--selector=app={app}"),
        "--field-selector=status.phase=Running".to_string(),
        "-o".to_string(),
        "jsonpath={.items[*].metadata.name}".to_string(),
    ]
}
