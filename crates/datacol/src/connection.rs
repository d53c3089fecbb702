//! Per-invocation access to local state, stacks, and remote controllers

use datacol_core::provider::{self, ProviderContext};
use datacol_core::{
    Client, Config, ExecBridge, Gateway, HttpController, Paths, Provider, StackRegistry,
    StateStore,
};
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// Opened once per process; owns the state store for the whole run
pub struct ConnectionManager {
    pub paths: Paths,
    pub config: Config,
    store: StateStore,
    stack: Option<String>,
}

impl ConnectionManager {
    /// Resolve the root, load `config.toml`, and open (and lock) the store
    pub fn open(home: Option<&Path>, stack: Option<String>) -> Result<Self> {
        let paths = Paths::resolve(home)?;
        debug!("Using datacol root {}", paths.root().display());

        let config = Config::load_from_path(&paths.config_file())?;
        let store = StateStore::open(&paths)?;

        Ok(Self {
            paths,
            config,
            store,
            stack: stack.filter(|s| !s.is_empty()),
        })
    }

    pub fn registry(&self) -> StackRegistry<'_> {
        StackRegistry::new(&self.store)
    }

    /// `--stack`/`$STACK`, else the current stack pointer
    pub fn stack_name(&self) -> Result<String> {
        Ok(self.registry().resolve_stack_name(self.stack.as_deref())?)
    }

    /// Session bound to the active stack
    pub fn client(&self) -> Result<Client> {
        self.client_for(&self.stack_name()?)
    }

    /// Session bound to `name`
    pub fn client_for(&self, name: &str) -> Result<Client> {
        let mut client = Client::new(env!("CARGO_PKG_VERSION"), self.paths.clone());
        client.set_stack(&self.registry(), name)?;
        Ok(client)
    }

    /// Controller gateway for the active stack
    pub fn gateway(&self) -> Result<Gateway> {
        let name = self.stack_name()?;
        let auth = self.registry().load_auth(&name)?;
        debug!("Connecting to controller of {} at {}", name, auth.api_server);

        let controller = HttpController::from_auth(&auth, &self.config)?;
        Ok(Gateway::new(Box::new(controller), name))
    }

    /// Provider acting on the stack bound to `client`
    pub fn provider(&self, client: &Client) -> Result<Box<dyn Provider>> {
        let stack = client.stack()?;
        Ok(provider::build(
            &self.config,
            &self.paths,
            ProviderContext::from_stack(stack),
        ))
    }

    /// Provider for a stack that does not exist yet
    pub fn bootstrap_provider(&self, name: &str, zone: &str) -> Box<dyn Provider> {
        provider::build(
            &self.config,
            &self.paths,
            ProviderContext::bootstrap(name, zone),
        )
    }

    pub fn exec_bridge(&self) -> ExecBridge {
        ExecBridge::from_config(&self.config, self.paths.clone())
    }

    /// Release the store lock
    pub fn close(self) -> Result<()> {
        Ok(self.store.close()?)
    }
}
