//! Error types for the datacol binary

use colored::Colorize;
use datacol_core::{ConfigError, CoreError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the datacol application
#[derive(Error, Debug)]
pub enum DatacolError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("cluster config for stack '{stack}' is missing at {}", path.display())]
    ClusterConfigMissing { stack: String, path: PathBuf },

    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    #[error("Output formatting error: {message}")]
    OutputError { message: String },
}

/// Result type for datacol commands
pub type Result<T> = std::result::Result<T, DatacolError>;

impl DatacolError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            DatacolError::Core(e) if e.is_not_initialized() => vec![
                "Create a stack: datacol init".to_string(),
                "List stacks known to this machine: datacol stacks".to_string(),
                "Pick a stack explicitly: datacol --stack <name> <command>".to_string(),
            ],
            DatacolError::Core(CoreError::InvalidStackName { .. }) => vec![
                "Use lowercase letters, digits and '-', e.g. datacol --stack prod init"
                    .to_string(),
            ],
            DatacolError::Core(CoreError::AlreadyLocked { .. }) => vec![
                "Wait for the other datacol command to finish, then retry".to_string(),
            ],
            DatacolError::Core(CoreError::ProjectResolution { .. }) => vec![
                "Set a default project: gcloud config set project <project-id>".to_string(),
                "Check your login: gcloud auth list".to_string(),
            ],
            DatacolError::Core(CoreError::Credential { .. }) => vec![
                "Check that your account may create service account keys".to_string(),
            ],
            DatacolError::Core(CoreError::Subprocess { program, .. }) => vec![
                format!("Check that '{program}' is installed and on your PATH"),
                "Override the tool in config.toml (cloud_tool, storage_tool, exec_tool)"
                    .to_string(),
            ],
            DatacolError::Core(CoreError::RemoteCall { message, .. })
                if message.contains("not found") =>
            {
                vec!["List apps on this stack: datacol apps list".to_string()]
            }
            DatacolError::Core(CoreError::RemoteCall { .. }) => vec![
                "Check that the stack is reachable: datacol apps list -v".to_string(),
            ],
            DatacolError::Core(CoreError::InitDeclined { .. }) => vec![
                "Enable the listed APIs, then re-run: datacol init --yes".to_string(),
            ],
            DatacolError::ClusterConfigMissing { stack, .. } => vec![
                format!("Re-run init to write it again: datacol --stack {stack} init --yes"),
                "Or run through the controller: datacol run <app> --controller -- <cmd>"
                    .to_string(),
            ],
            DatacolError::InvalidInput { .. } => vec![
                "Check the command syntax: datacol <command> --help".to_string(),
            ],
            _ => vec![],
        }
    }

    /// Error message followed by any suggestions, colored for a terminal
    pub fn display_with_suggestions(&self) -> String {
        let mut out = format!("{}{} {}", "error".red().bold(), ":".bold(), self);

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push('\n');
            for suggestion in suggestions {
                out.push_str(&format!("\n  {}{} {}", "tip".yellow().bold(), ":".bold(), suggestion));
            }
        }

        out
    }
}

impl From<ConfigError> for DatacolError {
    fn from(err: ConfigError) -> Self {
        DatacolError::Core(CoreError::Config(err))
    }
}

impl From<anyhow::Error> for DatacolError {
    fn from(err: anyhow::Error) -> Self {
        DatacolError::OutputError {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for DatacolError {
    fn from(err: std::io::Error) -> Self {
        DatacolError::OutputError {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<dialoguer::Error> for DatacolError {
    fn from(err: dialoguer::Error) -> Self {
        DatacolError::InvalidInput {
            message: format!("failed to read confirmation: {}", err),
        }
    }
}
