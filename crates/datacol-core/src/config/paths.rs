//! Per-user directory layout
//!
//! All local state lives under a single root (`~/.datacol` by default). Stack
//! directories are created on demand and only ever with owner-only
//! permissions, since they hold service account keys.

use directories::BaseDirs;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, Result};

/// Environment variable overriding the root directory
pub const HOME_ENV: &str = "DATACOL_HOME";

const ROOT_DIR_NAME: &str = ".datacol";
const CONFIG_FILE_NAME: &str = "config.toml";
const STORE_FILE_NAME: &str = "state.json";
const LOCK_FILE_NAME: &str = "state.lock";
const CREDENTIAL_FILE_NAME: &str = "credentials.json";
const KUBECONFIG_FILE_NAME: &str = "kubeconfig";

/// Resolved locations of every file the CLI reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Use `root` as the datacol home directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the root directory
    ///
    /// Resolution order:
    /// 1. `explicit` (the `--home` flag)
    /// 2. `$DATACOL_HOME`
    /// 3. `~/.datacol`
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }

        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }

        let base_dirs = BaseDirs::new().ok_or(ConfigError::ConfigDirError)?;
        Ok(Self::new(base_dirs.home_dir().join(ROOT_DIR_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn store_file(&self) -> PathBuf {
        self.root.join(STORE_FILE_NAME)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Per-stack config directory
    pub fn stack_dir(&self, stack: &str) -> PathBuf {
        self.root.join(stack)
    }

    /// Service account key saved during init
    pub fn credential_file(&self, stack: &str) -> PathBuf {
        self.stack_dir(stack).join(CREDENTIAL_FILE_NAME)
    }

    /// Cluster connection config used by the exec tool
    pub fn kubeconfig_file(&self, stack: &str) -> PathBuf {
        self.stack_dir(stack).join(KUBECONFIG_FILE_NAME)
    }

    /// Create the root directory (0700) if it does not exist yet
    pub fn ensure_root(&self) -> Result<()> {
        create_private_dir(&self.root)
    }

    /// Create a stack directory (0700) if it does not exist yet
    pub fn ensure_stack_dir(&self, stack: &str) -> Result<PathBuf> {
        let dir = self.stack_dir(stack);
        create_private_dir(&dir)?;
        Ok(dir)
    }
}

fn create_private_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder
        .create(path)
        .map_err(|source| ConfigError::CreateDirError {
            path: path.display().to_string(),
            source,
        })
}
