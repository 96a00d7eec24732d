//! Error taxonomy shared by the provider boundary and the command layer.

use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by an [`UpdateProvider`](crate::provider::UpdateProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("malformed search criteria '{criteria}': {reason}")]
    MalformedCriteria { criteria: String, reason: String },

    #[error("update service unreachable: {0}")]
    Unreachable(String),

    #[error("unknown update '{0}'")]
    UnknownUpdate(String),

    #[error("content path '{}' is inaccessible: {source}", path.display())]
    InaccessibleContent {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog format error: {0}")]
    Format(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn malformed(criteria: &str, reason: impl Into<String>) -> Self {
        Self::MalformedCriteria {
            criteria: criteria.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures of a single command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Bad, missing or malformed parameters. Raised before any provider call.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrong number of elements where exactly one is required.
    #[error("expected exactly one {what}, got {actual}")]
    Cardinality { what: &'static str, actual: usize },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl CommandError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
pub type CommandResult<T> = std::result::Result<T, CommandError>;
