//! # datacol-core
//!
//! Client-side control layer for the datacol CLI. It owns everything that
//! happens on the operator's machine:
//!
//! - **Local state** - a file-backed key/value [`StateStore`] under the
//!   per-user root, with typed access through [`StackRegistry`]
//! - **Stack lifecycle** - the multi-step init and teardown workflows in
//!   [`lifecycle`], which never commit local records ahead of remote truth
//! - **Remote operations** - the controller [`Gateway`] for apps,
//!   environment, processes and log streaming
//! - **Remote exec** - the [`ExecBridge`] that runs commands in a live pod
//!   through the external cluster tool and propagates its exit status
//!
//! Cloud specifics sit behind the [`Provider`] trait and the controller wire
//! protocol behind the [`Controller`] trait, so the workflows here can be
//! driven by fakes in tests.
//!
//! ## Example
//!
//! ```rust,ignore
//! use datacol_core::{Config, Paths, StateStore, StackRegistry};
//!
//! let paths = Paths::resolve(None)?;
//! let config = Config::load_from_path(&paths.config_file())?;
//! let store = StateStore::open(&paths)?;
//! let registry = StackRegistry::new(&store);
//!
//! for stack in registry.list_stacks()? {
//!     println!("{} ({})", stack.name, stack.project_id);
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod exec;
pub mod lifecycle;
pub mod process;
pub mod provider;
pub mod registry;
pub mod store;

pub use config::{Config, ConfigError, Paths, ProviderKind};
pub use controller::{
    App, CmdResponse, Controller, Environment, Gateway, HttpController, LogStream,
    LogStreamRequest, RemoteError,
};
pub use error::{CoreError, Result};
pub use exec::{ExecBridge, ExecOutcome};
pub use lifecycle::{
    ConfirmedInit, InitOptions, InitOutcome, InitRequest, InitState, PendingInit, StackLifecycle,
    TeardownOutcome, TeardownState,
};
pub use provider::{CredentialGrant, GcloudProvider, Provider, StackEndpoint};
pub use registry::{Auth, Client, Stack, StackRegistry, validate_stack_name};
pub use store::StateStore;
