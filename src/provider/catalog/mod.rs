//! Local Catalog Provider
//!
//! An [`UpdateProvider`] whose updates, history and staged content live in a
//! single JSON catalog file. Every state-changing call rewrites the file under
//! an advisory lock so separate `wuactl` processes observe each other's work.

mod criteria;

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    HistoryEntry, InstallOutcome, InstallationBehavior, OperationResultCode, SearchCriteria,
    UpdateOperation, UpdateProvider, UpdateRef, UpdateSet,
};
use crate::error::{ProviderError, ProviderResult};
use criteria::Criteria;

const MAX_LOCK_RETRIES: usize = 10;
const LOCK_RETRY_SLEEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    #[default]
    Software,
    Driver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAction {
    #[default]
    Installation,
    Uninstallation,
}

/// A payload file pre-positioned for an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    pub path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

/// One update as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogUpdate {
    pub update_id: String,
    #[serde(default)]
    pub revision: u32,
    pub title: String,
    #[serde(default)]
    pub update_type: UpdateType,
    #[serde(default)]
    pub deployment_action: DeploymentAction,
    #[serde(default)]
    pub eula_accepted: bool,
    #[serde(default)]
    pub is_downloaded: bool,
    #[serde(default)]
    pub is_installed: bool,
    #[serde(default)]
    pub is_superseded: bool,
    /// Only offered by the remote update service, not by the local one
    #[serde(default)]
    pub remote_only: bool,
    #[serde(default)]
    pub installation_behavior: InstallationBehavior,
    #[serde(default)]
    pub staged_content: Vec<StagedFile>,
}

impl CatalogUpdate {
    pub fn new(update_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            update_id: update_id.into(),
            revision: 1,
            title: title.into(),
            update_type: UpdateType::default(),
            deployment_action: DeploymentAction::default(),
            eula_accepted: false,
            is_downloaded: false,
            is_installed: false,
            is_superseded: false,
            remote_only: false,
            installation_behavior: InstallationBehavior::default(),
            staged_content: Vec::new(),
        }
    }
}

/// Persistent catalog state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Provider instance id stamped on every handle
    pub id: Uuid,
    /// Simulates the remote update service being unreachable
    #[serde(default)]
    pub remote_service_offline: bool,
    #[serde(default)]
    pub updates: Vec<CatalogUpdate>,
    /// Operation history, most recent first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_service_offline: false,
            updates: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_updates(mut self, updates: Vec<CatalogUpdate>) -> Self {
        self.updates = updates;
        self
    }

    fn to_ref(&self, update: &CatalogUpdate) -> UpdateRef {
        UpdateRef {
            provider_id: self.id,
            update_id: update.update_id.clone(),
            revision: update.revision,
            title: update.title.clone(),
            eula_accepted: update.eula_accepted,
            is_downloaded: update.is_downloaded,
            is_installed: update.is_installed,
            is_superseded: update.is_superseded,
            installation_behavior: update.installation_behavior,
        }
    }

    fn position(&self, update: &UpdateRef) -> ProviderResult<usize> {
        self.updates
            .iter()
            .position(|u| u.update_id == update.update_id)
            .ok_or_else(|| ProviderError::UnknownUpdate(update.update_id.clone()))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CatalogProvider {
    path: Option<PathBuf>,
    id: Uuid,
    catalog: RwLock<Catalog>,
}

impl CatalogProvider {
    /// Provider over an in-memory catalog that is never written to disk
    pub fn in_memory(catalog: Catalog) -> Self {
        Self {
            path: None,
            id: catalog.id,
            catalog: RwLock::new(catalog),
        }
    }

    /// Open the catalog file at `path`
    pub async fn open(path: impl Into<PathBuf>) -> ProviderResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(ProviderError::Unreachable(format!(
                "no update catalog at '{}'",
                path.display()
            )));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let catalog: Catalog = serde_json::from_str(&content)?;
        info!(
            "Opened update catalog '{}' ({} updates, {} history entries)",
            path.display(),
            catalog.updates.len(),
            catalog.history.len()
        );
        Ok(Self {
            path: Some(path),
            id: catalog.id,
            catalog: RwLock::new(catalog),
        })
    }

    /// Write a catalog to `path`, refusing to overwrite unless `force` is set
    pub async fn create(path: impl AsRef<Path>, catalog: &Catalog, force: bool) -> ProviderResult<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(ProviderError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("catalog '{}' already exists", path.display()),
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        write_locked(path.to_path_buf(), serde_json::to_vec_pretty(catalog)?).await
    }

    /// Copy of the current catalog state
    pub async fn snapshot(&self) -> Catalog {
        self.catalog.read().await.clone()
    }

    async fn persist(&self, catalog: &Catalog) -> ProviderResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        debug!("Persisting update catalog to '{}'", path.display());
        write_locked(path.clone(), serde_json::to_vec_pretty(catalog)?).await
    }
}

async fn write_locked(path: PathBuf, bytes: Vec<u8>) -> ProviderResult<()> {
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let file = OpenOptions::new().write(true).create(true).truncate(false).open(&path)?;
        for _ in 0..MAX_LOCK_RETRIES {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    let mut file = &file;
                    file.set_len(0)?;
                    file.write_all(&bytes)?;
                    file.flush()?;
                    file.sync_all()?;
                    let _ = FileExt::unlock(file);
                    return Ok(());
                }
                Err(_) => std::thread::sleep(LOCK_RETRY_SLEEP),
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "could not acquire exclusive lock on update catalog",
        ))
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(())
}

/// Hash one content file, mapping any I/O failure to an inaccessible-path error
fn hash_content(path: &Path) -> ProviderResult<StagedFile> {
    let inaccessible = |source| ProviderError::InaccessibleContent {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(inaccessible)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(inaccessible)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(StagedFile {
        path: path.to_path_buf(),
        sha256: hex::encode(hasher.finalize()),
        size,
    })
}

#[async_trait]
impl UpdateProvider for CatalogProvider {
    fn instance_id(&self) -> Uuid {
        self.id
    }

    async fn search(&self, criteria: &SearchCriteria) -> ProviderResult<UpdateSet> {
        let filter = Criteria::parse(&criteria.criteria)?;
        let catalog = self.catalog.read().await;

        if criteria.use_remote_service && catalog.remote_service_offline {
            return Err(ProviderError::Unreachable("remote update service is offline".into()));
        }

        let found: UpdateSet = catalog
            .updates
            .iter()
            .filter(|u| criteria.use_remote_service || !u.remote_only)
            .filter(|u| criteria.include_superseded || !u.is_superseded)
            .filter(|u| filter.matches(u))
            .map(|u| catalog.to_ref(u))
            .collect();

        debug!("Catalog search '{}' matched {} updates", criteria.criteria, found.len());
        Ok(found)
    }

    async fn download(&self, updates: &UpdateSet) -> ProviderResult<UpdateSet> {
        let mut catalog = self.catalog.write().await;
        let mut attempted = Vec::new();

        for update in updates {
            let idx = catalog.position(update)?;
            let entry = &mut catalog.updates[idx];
            if !entry.eula_accepted || entry.installation_behavior.can_request_user_input {
                debug!("Skipping download of '{}'", entry.title);
                continue;
            }
            entry.is_downloaded = true;
            attempted.push(idx);
        }

        self.persist(&catalog).await?;
        Ok(attempted.into_iter().map(|idx| catalog.to_ref(&catalog.updates[idx])).collect())
    }

    async fn install(&self, updates: &UpdateSet) -> ProviderResult<InstallOutcome> {
        let mut catalog = self.catalog.write().await;
        let mut installed = Vec::new();
        let mut reboot_required = false;

        for update in updates {
            let idx = catalog.position(update)?;
            if !catalog.updates[idx].is_downloaded {
                continue;
            }
            let entry = &mut catalog.updates[idx];
            reboot_required |= entry.installation_behavior.reboot_behavior.requires_reboot();
            if entry.is_installed {
                debug!("'{}' is already installed", entry.title);
                installed.push(idx);
                continue;
            }
            entry.is_installed = true;
            let record = HistoryEntry {
                operation: UpdateOperation::Installation,
                result_code: OperationResultCode::Succeeded,
                hresult: 0,
                date: Utc::now(),
                update_id: entry.update_id.clone(),
                title: entry.title.clone(),
                description: String::new(),
            };
            catalog.history.insert(0, record);
            installed.push(idx);
        }

        self.persist(&catalog).await?;
        let installed: UpdateSet = installed
            .into_iter()
            .map(|idx| catalog.to_ref(&catalog.updates[idx]))
            .collect();
        let result_code = if installed.is_empty() {
            OperationResultCode::NotStarted
        } else {
            OperationResultCode::Succeeded
        };
        Ok(InstallOutcome {
            installed,
            reboot_required,
            result_code,
            hresult: 0,
        })
    }

    async fn total_history_count(&self) -> ProviderResult<usize> {
        Ok(self.catalog.read().await.history.len())
    }

    async fn query_history(&self, start: usize, count: usize) -> ProviderResult<Vec<HistoryEntry>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.history.iter().skip(start).take(count).cloned().collect())
    }

    async fn stage_content(&self, update: &UpdateRef, paths: &[PathBuf]) -> ProviderResult<()> {
        {
            let catalog = self.catalog.read().await;
            let idx = catalog.position(update)?;
            if catalog.updates[idx].is_downloaded {
                return Ok(());
            }
        }

        let paths = paths.to_vec();
        let staged = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|p| hash_content(p))
                .collect::<ProviderResult<Vec<_>>>()
        })
        .await
        .map_err(std::io::Error::other)??;

        let mut catalog = self.catalog.write().await;
        let idx = catalog.position(update)?;
        if catalog.updates[idx].is_downloaded {
            return Ok(());
        }
        let entry = &mut catalog.updates[idx];
        info!("Staged {} content file(s) for '{}'", staged.len(), entry.title);
        entry.staged_content.extend(staged);
        entry.is_downloaded = true;

        self.persist(&catalog).await
    }

    async fn set_eula_acceptance(&self, updates: &UpdateSet, accept: bool) -> ProviderResult<()> {
        if !accept {
            return Ok(());
        }
        let mut catalog = self.catalog.write().await;
        for update in updates {
            let idx = catalog.position(update)?;
            let entry = &mut catalog.updates[idx];
            if !entry.eula_accepted {
                entry.eula_accepted = true;
            } else {
                warn!("EULA for '{}' was already accepted", entry.title);
            }
        }
        self.persist(&catalog).await
    }
}
