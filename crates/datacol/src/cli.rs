//! CLI structure and command definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::output::OutputFormat;

/// Provision cloud stacks and operate the apps running on them
#[derive(Parser, Debug)]
#[command(name = "datacol")]
#[command(version, about = "Provision cloud stacks and operate the apps running on them")]
#[command(long_about = "
Provision cloud stacks and operate the apps running on them

A stack is one cluster, storage bucket and service account in your cloud
project. Create one with `datacol init`, then manage apps on it.

EXAMPLES:
    # Create a stack in the current gcloud project
    datacol --stack demo init --zone us-east1-b

    # Deploy-side operations on the current stack
    datacol apps create web
    datacol env set web PORT=8080 LOG_LEVEL=info
    datacol logs web --follow --since 10m

    # Run a command inside a running pod
    datacol run web -- rake db:migrate

    # Tear the stack down again
    datacol destroy

For more help on a specific command, run:
    datacol <command> --help
")]
pub struct Cli {
    /// Root directory for datacol state
    #[arg(long, global = true, env = "DATACOL_HOME")]
    pub home: Option<PathBuf>,

    /// Stack to operate on (defaults to the last initialized stack; `init` creates it)
    #[arg(long, short, global = true, env = "STACK")]
    pub stack: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new stack
    #[command(after_help = "EXAMPLES:
    # Defaults: stack demo, 2 preemptible n1-standard-1 nodes
    datacol init

    # Reuse an existing cluster and skip the confirmation prompt
    datacol --stack prod init --cluster shared-cluster --yes
")]
    Init(InitArgs),

    /// Destroy the current stack
    #[command(visible_alias = "teardown")]
    Destroy {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// List stacks known to this machine
    Stacks,

    /// App management
    #[command(subcommand)]
    Apps(AppsCommands),

    /// App environment variables
    #[command(subcommand)]
    Env(EnvCommands),

    /// Stream app logs
    Logs {
        /// App name (defaults to the current directory name)
        name: Option<String>,

        /// Keep streaming new output
        #[arg(long, short)]
        follow: bool,

        /// How far back to start, e.g. 30s, 2m, 1h
        #[arg(long, default_value = "2m", value_parser = parse_duration)]
        since: Duration,
    },

    /// Run a command inside a running pod of an app
    #[command(after_help = "EXAMPLES:
    datacol run web -- ls -la
    datacol run web --controller -- rake db:migrate
")]
    Run {
        /// App name
        app: String,

        /// Run through the controller instead of the cluster tool
        #[arg(long)]
        controller: bool,

        /// Command and arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Version information
    #[command(visible_alias = "ver")]
    Version,
}

/// Stack created by `datacol init` when `--stack`/`$STACK` is not given
pub const DEFAULT_INIT_STACK: &str = "demo";

impl Cli {
    /// Name of the stack `datacol init` creates
    pub fn init_stack_name(&self) -> &str {
        self.stack
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_INIT_STACK)
    }
}

/// Flags of `datacol init`; the stack name comes from the global `--stack`
#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Zone for the cluster
    #[arg(long, default_value = "us-east1-b")]
    pub zone: String,

    /// Storage bucket (defaults to datacol-<project>)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Number of cluster nodes
    #[arg(long, default_value_t = 2)]
    pub nodes: u32,

    /// Existing cluster to use instead of creating one
    #[arg(long)]
    pub cluster: Option<String>,

    /// Node disk size in GB
    #[arg(long, default_value_t = 10)]
    pub disk_size: u32,

    /// Node machine type
    #[arg(long, default_value = "n1-standard-1")]
    pub machine_type: String,

    /// Use preemptible nodes
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub preemptible: bool,

    /// Opt out of product update emails
    #[arg(long)]
    pub opt_out: bool,

    /// API password (generated when omitted)
    #[arg(long, env = "DATACOL_API_KEY", hide_env_values = true)]
    pub password: Option<String>,

    /// Kubernetes version for a new cluster
    #[arg(long, default_value = "1.6.4")]
    pub cluster_version: String,

    /// Confirm that the required cloud APIs are enabled
    #[arg(long, short)]
    pub yes: bool,
}

/// App commands
#[derive(Subcommand, Debug)]
pub enum AppsCommands {
    /// List apps
    #[command(visible_alias = "ls")]
    List,
    /// Show one app
    Get { name: String },
    /// Create an app
    Create { name: String },
    /// Delete an app
    #[command(visible_alias = "rm")]
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Restart all processes of an app
    Restart { name: String },
}

/// Environment commands
#[derive(Subcommand, Debug)]
pub enum EnvCommands {
    /// Show the environment of an app
    Get { name: String },
    /// Replace the environment of an app
    Set {
        name: String,
        /// KEY=VALUE pairs
        #[arg(required = true, value_parser = parse_env_pair)]
        vars: Vec<(String, String)>,
    },
}

/// Log windows are sent to the controller in whole seconds
fn parse_duration(value: &str) -> Result<Duration, String> {
    let duration =
        humantime::parse_duration(value).map_err(|e| format!("invalid duration '{value}': {e}"))?;
    if duration.subsec_nanos() != 0 {
        return Err(format!(
            "invalid duration '{value}': must be a whole number of seconds"
        ));
    }
    Ok(duration)
}

fn parse_env_pair(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{value}'")),
    }
}
