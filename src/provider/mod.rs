//! Update Provider Module
//!
//! The capability set every update backend must implement. The orchestrator
//! treats each call as opaque beyond the contract documented here.

pub mod catalog;
mod types;

pub use catalog::{Catalog, CatalogProvider, CatalogUpdate};
pub use types::{
    HistoryEntry, InstallOutcome, InstallationBehavior, OperationResultCode, RebootBehavior,
    SearchCriteria, UpdateOperation, UpdateRef, UpdateSet,
};

use crate::error::ProviderResult;
use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

/// Trait for update backends (object-safe, used as `Arc<dyn UpdateProvider>`)
#[async_trait]
pub trait UpdateProvider: Send + Sync {
    /// Identity of this provider instance. Every handle it produces carries it.
    fn instance_id(&self) -> Uuid;

    /// Find updates matching the criteria, in provider order
    async fn search(&self, criteria: &SearchCriteria) -> ProviderResult<UpdateSet>;

    /// Download the given updates.
    ///
    /// Updates without EULA acceptance or that can request user input are
    /// skipped; the result holds only those for which a download was attempted.
    async fn download(&self, updates: &UpdateSet) -> ProviderResult<UpdateSet>;

    /// Install the given updates. Updates not yet downloaded are skipped silently.
    async fn install(&self, updates: &UpdateSet) -> ProviderResult<InstallOutcome>;

    /// Number of entries in the provider's operation history
    async fn total_history_count(&self) -> ProviderResult<usize>;

    /// Slice of the operation history, most recent first
    async fn query_history(&self, start: usize, count: usize) -> ProviderResult<Vec<HistoryEntry>>;

    /// Pre-position payload files so the update counts as locally available.
    /// No-op when the update is already downloaded.
    async fn stage_content(&self, update: &UpdateRef, paths: &[PathBuf]) -> ProviderResult<()>;

    /// Accept (or not) the license of each update whose EULA is still pending.
    /// `accept = false` never revokes an earlier acceptance.
    async fn set_eula_acceptance(&self, updates: &UpdateSet, accept: bool) -> ProviderResult<()>;
}
