//! Uniform command output record and pipeline input parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CommandError, CommandResult};
use crate::provider::{HistoryEntry, UpdateRef, UpdateSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    GetUpdate,
    StartDownload,
    InstallUpdate,
    GetUpdateHistory,
    CopyContentToCache,
    SetEula,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::GetUpdate => "get-update",
            CommandKind::StartDownload => "start-download",
            CommandKind::InstallUpdate => "install-update",
            CommandKind::GetUpdateHistory => "get-update-history",
            CommandKind::CopyContentToCache => "copy-content-to-cache",
            CommandKind::SetEula => "set-eula",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One emitted object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Update(UpdateRef),
    History(HistoryEntry),
    RebootRequired { value: bool },
}

/// Output of a single command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub command: CommandKind,
    /// Emitted objects, in emission order
    #[serde(default)]
    pub records: Vec<Record>,
    /// Verbose side channel; only filled when verbose output is enabled.
    /// Never serialized, so it cannot leak into a pipeline.
    #[serde(skip)]
    pub diagnostics: Vec<String>,
}

impl CommandOutput {
    pub fn new(command: CommandKind) -> Self {
        Self {
            command,
            records: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn emit(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn emit_updates(&mut self, updates: UpdateSet) {
        self.records.extend(updates.into_iter().map(Record::Update));
    }

    pub fn diagnostic(&mut self, line: impl Into<String>) {
        self.diagnostics.push(line.into());
    }

    /// Update records in emission order
    pub fn updates(&self) -> UpdateSet {
        self.records
            .iter()
            .filter_map(|r| match r {
                Record::Update(u) => Some(u.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn history(&self) -> Vec<&HistoryEntry> {
        self.records
            .iter()
            .filter_map(|r| match r {
                Record::History(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn reboot_required(&self) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r, Record::RebootRequired { value: true }))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PipelineInput {
    Output(CommandOutput),
    Many(Vec<UpdateRef>),
    One(UpdateRef),
}

/// Parse updates handed over from a previous command.
///
/// Accepts a full command output, an array of update handles or a single
/// handle. Blank input yields an empty set.
pub fn parse_pipeline(input: &str) -> CommandResult<UpdateSet> {
    if input.trim().is_empty() {
        return Ok(UpdateSet::new());
    }
    let parsed: PipelineInput = serde_json::from_str(input)
        .map_err(|e| CommandError::validation(format!("unreadable pipeline input: {}", e)))?;
    Ok(match parsed {
        PipelineInput::Output(output) => output.updates(),
        PipelineInput::Many(updates) => UpdateSet::from(updates),
        PipelineInput::One(update) => UpdateSet::from(vec![update]),
    })
}
