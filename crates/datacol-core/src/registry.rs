//! Stack registry and client session
//!
//! Typed access over the [`StateStore`]: named [`Stack`] records, the
//! per-stack [`Auth`] records, and the pointer to the stack selected by the
//! last successful init.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Paths;
use crate::error::{CoreError, Result};
use crate::store::StateStore;

const STACKS_BUCKET: &str = "stacks";
const AUTH_BUCKET: &str = "auth";
const SESSION_BUCKET: &str = "session";
const CURRENT_STACK_KEY: &str = "current_stack";

/// One provisioned infrastructure instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    pub project_id: String,
    pub zone: String,
    pub bucket: String,
    /// Service account key issued during init
    #[serde(with = "base64_bytes")]
    pub service_key: Vec<u8>,
}

/// How to reach and authenticate to a stack's controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub name: String,
    pub project: String,
    pub bucket: String,
    pub api_server: String,
    pub api_key: String,
}

/// Typed CRUD over stack and auth records
#[derive(Debug, Clone, Copy)]
pub struct StackRegistry<'s> {
    store: &'s StateStore,
}

impl<'s> StackRegistry<'s> {
    pub fn new(store: &'s StateStore) -> Self {
        Self { store }
    }

    pub fn get_stack(&self, name: &str) -> Result<Option<Stack>> {
        self.store.fetch(STACKS_BUCKET, name)
    }

    pub fn save_stack(&self, stack: &Stack) -> Result<()> {
        self.store.persist(STACKS_BUCKET, &stack.name, stack)
    }

    pub fn delete_stack(&self, name: &str) -> Result<bool> {
        self.store.delete(STACKS_BUCKET, name)
    }

    /// All registered stacks sorted by name
    pub fn list_stacks(&self) -> Result<Vec<Stack>> {
        self.store
            .keys(STACKS_BUCKET)
            .iter()
            .filter_map(|name| self.get_stack(name).transpose())
            .collect()
    }

    pub fn get_auth(&self, stack: &str) -> Result<Option<Auth>> {
        self.store.fetch(AUTH_BUCKET, stack)
    }

    /// Load the auth record for `stack`; absence means "not initialized"
    pub fn load_auth(&self, stack: &str) -> Result<Auth> {
        self.get_auth(stack)?
            .ok_or_else(|| CoreError::NotInitialized {
                stack: stack.to_string(),
            })
    }

    pub fn set_auth(&self, auth: &Auth) -> Result<()> {
        self.store.persist(AUTH_BUCKET, &auth.name, auth)
    }

    pub fn delete_auth(&self, stack: &str) -> Result<bool> {
        self.store.delete(AUTH_BUCKET, stack)
    }

    /// Stack selected by the last successful init, if any
    pub fn current_stack(&self) -> Result<Option<String>> {
        self.store.fetch(SESSION_BUCKET, CURRENT_STACK_KEY)
    }

    pub fn set_current_stack(&self, name: &str) -> Result<()> {
        self.store.persist(SESSION_BUCKET, CURRENT_STACK_KEY, name)
    }

    /// Clear the current-stack pointer if it points at `name`
    pub fn clear_current_stack(&self, name: &str) -> Result<()> {
        if self.current_stack()?.as_deref() == Some(name) {
            self.store.delete(SESSION_BUCKET, CURRENT_STACK_KEY)?;
        }
        Ok(())
    }

    /// Pick the stack to operate on: an explicit name wins over the pointer
    pub fn resolve_stack_name(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(name) = explicit {
            validate_stack_name(name)?;
            return Ok(name.to_string());
        }

        let name = self
            .current_stack()?
            .ok_or_else(|| CoreError::NotInitialized {
                stack: "<none>".to_string(),
            })?;
        validate_stack_name(&name)?;
        Ok(name)
    }
}

/// Active session context, rebuilt each process from a stack name
#[derive(Debug, Clone)]
pub struct Client {
    pub version: String,
    pub stack_name: String,
    pub stack: Option<Stack>,
    paths: Paths,
}

impl Client {
    pub fn new(version: impl Into<String>, paths: Paths) -> Self {
        Self {
            version: version.into(),
            stack_name: String::new(),
            stack: None,
            paths,
        }
    }

    /// Select `name` as the active stack; the last call wins
    pub fn set_stack(&mut self, registry: &StackRegistry<'_>, name: &str) -> Result<&Stack> {
        validate_stack_name(name)?;
        self.stack_name = name.to_string();
        self.stack = None;

        let stack = registry
            .get_stack(name)?
            .ok_or_else(|| CoreError::NotInitialized {
                stack: name.to_string(),
            })?;
        debug!("Selected stack {} (project {})", stack.name, stack.project_id);

        let selected: &Stack = self.stack.insert(stack);
        Ok(selected)
    }

    /// The selected stack, or `NotInitialized` if none was set
    pub fn stack(&self) -> Result<&Stack> {
        self.stack.as_ref().ok_or_else(|| CoreError::NotInitialized {
            stack: self.stack_name.clone(),
        })
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Per-stack config directory
    pub fn config_root(&self) -> PathBuf {
        self.paths.stack_dir(&self.stack_name)
    }

    pub fn credential_path(&self) -> PathBuf {
        self.paths.credential_file(&self.stack_name)
    }

    pub fn kubeconfig_path(&self) -> PathBuf {
        self.paths.kubeconfig_file(&self.stack_name)
    }
}

/// Check that `name` can prefix cloud resources and name a directory
///
/// Names are lowercase letters, digits and `-`, start with a letter and do
/// not end with `-`. Anything else could resolve outside the stack's own
/// config directory.
pub fn validate_stack_name(name: &str) -> Result<()> {
    let invalid = |reason| CoreError::InvalidStackName {
        name: name.to_string(),
        reason,
    };

    let first = name.chars().next().ok_or_else(|| invalid("name is empty"))?;
    if !first.is_ascii_lowercase() {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("only lowercase letters, digits and '-' are allowed"));
    }
    if name.ends_with('-') {
        return Err(invalid("must not end with '-'"));
    }
    Ok(())
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn demo_stack() -> Stack {
        Stack {
            name: "demo".to_string(),
            project_id: "proj-1".to_string(),
            zone: "us-east1-b".to_string(),
            bucket: "datacol-proj-1".to_string(),
            service_key: br#"{"type":"service_account"}"#.to_vec(),
        }
    }

    #[test]
    fn test_stack_crud() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::open(&Paths::new(tmp.path())).unwrap();
        let registry = StackRegistry::new(&store);

        assert!(registry.get_stack("demo").unwrap().is_none());
        registry.save_stack(&demo_stack()).unwrap();
        assert_eq!(registry.get_stack("demo").unwrap(), Some(demo_stack()));
        assert_eq!(registry.list_stacks().unwrap(), vec![demo_stack()]);

        assert!(registry.delete_stack("demo").unwrap());
        assert!(registry.get_stack("demo").unwrap().is_none());
        assert!(!registry.delete_stack("demo").unwrap());
    }

    #[test]
    fn test_service_key_is_base64_in_store() {
        let stack = demo_stack();
        let encoded = serde_json::to_value(&stack).unwrap();
        assert_eq!(
            encoded["service_key"],
            "eyJ0eXBlIjoic2VydmljZV9hY2NvdW50In0="
        );
        let decoded: Stack = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, stack);
    }

    #[test]
    fn test_missing_auth_is_not_initialized() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::open(&Paths::new(tmp.path())).unwrap();
        let registry = StackRegistry::new(&store);

        let err = registry.load_auth("demo").unwrap_err();
        assert!(err.is_not_initialized());
    }

    #[test]
    fn test_current_stack_pointer() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::open(&Paths::new(tmp.path())).unwrap();
        let registry = StackRegistry::new(&store);

        assert!(registry.resolve_stack_name(None).is_err());
        assert_eq!(registry.resolve_stack_name(Some("prod")).unwrap(), "prod");

        registry.set_current_stack("demo").unwrap();
        assert_eq!(registry.resolve_stack_name(None).unwrap(), "demo");

        // Clearing a different stack leaves the pointer alone
        registry.clear_current_stack("prod").unwrap();
        assert_eq!(registry.current_stack().unwrap().as_deref(), Some("demo"));

        registry.clear_current_stack("demo").unwrap();
        assert!(registry.current_stack().unwrap().is_none());
    }

    #[test]
    fn test_client_set_stack_last_wins() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path());
        let store = StateStore::open(&paths).unwrap();
        let registry = StackRegistry::new(&store);
        registry.save_stack(&demo_stack()).unwrap();

        let mut client = Client::new("0.3.0", paths.clone());
        client.set_stack(&registry, "demo").unwrap();
        assert_eq!(client.stack().unwrap().project_id, "proj-1");
        assert_eq!(client.config_root(), paths.stack_dir("demo"));
        assert_eq!(client.kubeconfig_path(), tmp.path().join("demo").join("kubeconfig"));
        assert_eq!(
            client.credential_path(),
            tmp.path().join("demo").join("credentials.json")
        );

        let err = client.set_stack(&registry, "missing").unwrap_err();
        assert!(err.is_not_initialized());
        assert_eq!(client.stack_name, "missing");
        assert!(client.stack().is_err());
    }

    #[test]
    fn test_validate_stack_name() {
        for name in ["demo", "prod-2", "a"] {
            assert!(validate_stack_name(name).is_ok(), "{name}");
        }
        for name in ["", ".", "..", "../x", "/home/op", "a/b", "Demo", "2fast", "demo-", "de mo"] {
            assert!(
                matches!(
                    validate_stack_name(name),
                    Err(CoreError::InvalidStackName { .. })
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_rejects_unsafe_names() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::open(&Paths::new(tmp.path())).unwrap();
        let registry = StackRegistry::new(&store);

        let err = registry.resolve_stack_name(Some("..")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStackName { .. }));

        // A pointer written by an older install is checked too
        registry.set_current_stack("").unwrap();
        assert!(matches!(
            registry.resolve_stack_name(None).unwrap_err(),
            CoreError::InvalidStackName { .. }
        ));
    }

    #[test]
    fn test_client_rejects_unsafe_names() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path());
        let store = StateStore::open(&paths).unwrap();
        let registry = StackRegistry::new(&store);

        let mut client = Client::new("0.3.0", paths);
        let err = client.set_stack(&registry, "/etc").unwrap_err();
        assert!(matches!(err, CoreError::InvalidStackName { .. }));
        assert!(client.stack_name.is_empty());
    }
}
