use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Provider-reported classification of how strongly an update needs a restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootBehavior {
    #[default]
    NeverReboots,
    AlwaysRequiresReboot,
    CanRequestReboot,
}

impl RebootBehavior {
    /// Numeric tier: 0 never reboots, 1 always requires a reboot, 2 can request one.
    pub fn tier(&self) -> u8 {
        match self {
            RebootBehavior::NeverReboots => 0,
            RebootBehavior::AlwaysRequiresReboot => 1,
            RebootBehavior::CanRequestReboot => 2,
        }
    }

    pub fn requires_reboot(&self) -> bool {
        self.tier() > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstallationBehavior {
    #[serde(default)]
    pub reboot_behavior: RebootBehavior,
    #[serde(default)]
    pub can_request_user_input: bool,
}

/// A handle to one update unit known to a provider.
///
/// Handles are snapshots: the orchestrator never mutates them, and providers
/// hand back refreshed copies after state-changing calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRef {
    /// Instance id of the provider that produced this handle
    pub provider_id: Uuid,
    pub update_id: String,
    #[serde(default)]
    pub revision: u32,
    pub title: String,
    #[serde(default)]
    pub eula_accepted: bool,
    #[serde(default)]
    pub is_downloaded: bool,
    #[serde(default)]
    pub is_installed: bool,
    #[serde(default)]
    pub is_superseded: bool,
    #[serde(default)]
    pub installation_behavior: InstallationBehavior,
}

impl fmt::Display for UpdateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.update_id)
    }
}

/// Ordered collection of update handles; insertion order is pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateSet(Vec<UpdateRef>);

impl UpdateSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, update: UpdateRef) {
        self.0.push(update);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UpdateRef> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&UpdateRef> {
        self.0.first()
    }

    pub fn as_slice(&self) -> &[UpdateRef] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<UpdateRef> {
        self.0
    }

    /// Update ids in pipeline order
    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|u| u.update_id.as_str()).collect()
    }
}

impl From<Vec<UpdateRef>> for UpdateSet {
    fn from(updates: Vec<UpdateRef>) -> Self {
        Self(updates)
    }
}

impl FromIterator<UpdateRef> for UpdateSet {
    fn from_iter<I: IntoIterator<Item = UpdateRef>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for UpdateSet {
    type Item = UpdateRef;
    type IntoIter = std::vec::IntoIter<UpdateRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a UpdateSet {
    type Item = &'a UpdateRef;
    type IntoIter = std::slice::Iter<'a, UpdateRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Filter expression plus the two search switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub criteria: String,
    pub include_superseded: bool,
    pub use_remote_service: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOperation {
    Installation,
    Uninstallation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResultCode {
    NotStarted,
    InProgress,
    Succeeded,
    SucceededWithErrors,
    Failed,
    Aborted,
}

impl fmt::Display for OperationResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationResultCode::NotStarted => "NotStarted",
            OperationResultCode::InProgress => "InProgress",
            OperationResultCode::Succeeded => "Succeeded",
            OperationResultCode::SucceededWithErrors => "SucceededWithErrors",
            OperationResultCode::Failed => "Failed",
            OperationResultCode::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}

/// One past update operation as recorded by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub operation: UpdateOperation,
    pub result_code: OperationResultCode,
    #[serde(default)]
    pub hresult: i32,
    pub date: DateTime<Utc>,
    pub update_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Result of a single install call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallOutcome {
    pub installed: UpdateSet,
    pub reboot_required: bool,
    pub result_code: OperationResultCode,
    pub hresult: i32,
}
