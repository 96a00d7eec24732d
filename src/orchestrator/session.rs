//! Session State - the small amount of context shared by sequential commands
//! within one run. Never persisted; a fresh process starts from defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which update service searches are directed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerSelection {
    /// The locally configured (managed) service
    #[default]
    Default,
    /// The vendor's public update service
    Remote,
}

/// How download and install hand their selection to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One provider call with the complete selection
    #[default]
    Batch,
    /// One provider call per selected update, each with the set accumulated so far
    Incremental,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(DispatchMode::Batch),
            "incremental" => Ok(DispatchMode::Incremental),
            other => Err(format!("unknown dispatch mode '{}' (expected batch or incremental)", other)),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Batch => write!(f, "batch"),
            DispatchMode::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub server_selection: ServerSelection,
    pub include_superseded: bool,
}

impl SessionState {
    /// Apply the switches of a search invocation.
    ///
    /// Switches only ever turn a setting on; once a search has asked for the
    /// remote service or superseded updates, later searches in the same run
    /// keep doing so.
    pub fn apply_search_flags(&mut self, from_remote: bool, include_superseded: bool) {
        if include_superseded {
            self.include_superseded = true;
        }
        if from_remote {
            self.server_selection = ServerSelection::Remote;
        }
    }

    pub fn uses_remote_service(&self) -> bool {
        self.server_selection == ServerSelection::Remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = SessionState::default();
        assert_eq!(state.server_selection, ServerSelection::Default);
        assert!(!state.include_superseded);
        assert!(!state.uses_remote_service());
    }

    #[test]
    fn test_search_flags_are_sticky() {
        let mut state = SessionState::default();
        state.apply_search_flags(true, true);
        state.apply_search_flags(false, false);
        assert!(state.uses_remote_service());
        assert!(state.include_superseded);
    }

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!("Batch".parse::<DispatchMode>().unwrap(), DispatchMode::Batch);
        assert_eq!(" incremental ".parse::<DispatchMode>().unwrap(), DispatchMode::Incremental);
        assert!("parallel".parse::<DispatchMode>().is_err());
    }
}
