//! wuactl
//!
//! A thin command surface over an update agent:
//! - Search, download, install and history commands
//! - License acceptance and content staging
//! - Pluggable update providers behind one async trait
//! - A JSON-file catalog provider for local use

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod shell;

// Re-exports for convenience
pub use error::{CommandError, CommandResult, ProviderError, ProviderResult};
pub use orchestrator::{CommandOutput, Orchestrator, OrchestratorOptions};
pub use provider::{CatalogProvider, UpdateProvider, UpdateRef, UpdateSet};
