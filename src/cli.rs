//! Command-line surface: argument parsing, pipeline input and rendering.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::{OutputFormat, ShellConfig};
use crate::error::CommandResult;
use crate::orchestrator::{
    parse_pipeline, CommandKind, CommandOutput, DispatchMode, Orchestrator, Record, DEFAULT_CRITERIA,
    DEFAULT_HISTORY_COUNT,
};
use crate::provider::UpdateSet;

#[derive(Parser, Debug)]
#[command(name = "wuactl", version, about = "Search, download and install updates through an update provider")]
pub struct Cli {
    /// JSON config file (defaults to $WUACTL_CONFIG or ./wuactl.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Update catalog backing the local provider
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Output format: json or text
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Provider dispatch for download/install: batch or incremental
    #[arg(long, global = true)]
    pub dispatch: Option<DispatchMode>,

    /// Emit diagnostic lines on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Command-line flags win over file and environment settings
    pub fn apply_to(&self, config: &mut ShellConfig) {
        if let Some(catalog) = &self.catalog {
            config.catalog = catalog.clone();
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(dispatch) = self.dispatch {
            config.dispatch = dispatch;
        }
        if self.verbose {
            config.verbose = true;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(flatten)]
    Update(UpdateCommand),

    /// Interactive shell; the previous command's updates feed the next one
    Shell,

    /// Write an empty update catalog with a fresh provider id
    NewCatalog {
        /// Overwrite an existing catalog
        #[arg(long)]
        force: bool,
    },
}

/// The six update commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum UpdateCommand {
    /// Search for updates
    GetUpdate(GetUpdateArgs),
    /// Download updates from a previous command
    StartDownload(PipelineArgs),
    /// Install downloaded updates
    InstallUpdate(PipelineArgs),
    /// List past update operations
    GetUpdateHistory(HistoryArgs),
    /// Stage local payload files for exactly one update
    CopyContentToCache(StageArgs),
    /// Accept the license agreement of updates
    SetEula(EulaArgs),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct GetUpdateArgs {
    /// Search criteria
    #[arg(long, default_value = DEFAULT_CRITERIA)]
    pub criteria: String,

    /// Search the remote update service instead of the local one
    #[arg(long)]
    pub from_remote_service: bool,

    /// Include superseded updates
    #[arg(long)]
    pub include_superseded: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct PipelineArgs {
    /// JSON file with updates from a previous command ('-' for stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct HistoryArgs {
    /// First entry to return (negative values are treated as 0)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub start_index: i64,

    /// Number of entries to return (capped at the total available)
    #[arg(long, default_value_t = DEFAULT_HISTORY_COUNT, allow_negative_numbers = true)]
    pub count: i64,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct StageArgs {
    /// Payload file(s) for the update
    #[arg(long = "file-path", required = true, num_args = 1..)]
    pub file_paths: Vec<PathBuf>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct EulaArgs {
    /// Accept (true) or leave untouched (false)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub accept: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl UpdateCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            UpdateCommand::GetUpdate(_) => CommandKind::GetUpdate,
            UpdateCommand::StartDownload(_) => CommandKind::StartDownload,
            UpdateCommand::InstallUpdate(_) => CommandKind::InstallUpdate,
            UpdateCommand::GetUpdateHistory(_) => CommandKind::GetUpdateHistory,
            UpdateCommand::CopyContentToCache(_) => CommandKind::CopyContentToCache,
            UpdateCommand::SetEula(_) => CommandKind::SetEula,
        }
    }

    /// Pipeline arguments, for commands that consume updates
    pub fn pipeline(&self) -> Option<&PipelineArgs> {
        match self {
            UpdateCommand::StartDownload(p) | UpdateCommand::InstallUpdate(p) => Some(p),
            UpdateCommand::CopyContentToCache(a) => Some(&a.pipeline),
            UpdateCommand::SetEula(a) => Some(&a.pipeline),
            UpdateCommand::GetUpdate(_) | UpdateCommand::GetUpdateHistory(_) => None,
        }
    }

    pub async fn execute(&self, orch: &mut Orchestrator, updates: UpdateSet) -> CommandResult<CommandOutput> {
        match self {
            UpdateCommand::GetUpdate(a) => {
                orch.search(Some(a.criteria.as_str()), a.from_remote_service, a.include_superseded)
                    .await
            }
            UpdateCommand::StartDownload(_) => orch.download(&updates).await,
            UpdateCommand::InstallUpdate(_) => orch.install(&updates).await,
            UpdateCommand::GetUpdateHistory(a) => orch.history(a.start_index, a.count).await,
            UpdateCommand::CopyContentToCache(a) => orch.stage_content(&a.file_paths, &updates).await,
            UpdateCommand::SetEula(a) => orch.accept_eula(&updates, a.accept).await,
        }
    }
}

/// Read pipeline updates from a file, or from stdin when the path is absent or `-`
pub fn read_pipeline(path: Option<&Path>) -> Result<UpdateSet> {
    let content = match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read pipeline input '{}'", p.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read pipeline input from stdin")?;
            buf
        }
    };
    Ok(parse_pipeline(&content)?)
}

/// Render the emitted records. Void commands render nothing.
pub fn render(output: &CommandOutput, format: OutputFormat) -> Result<Option<String>> {
    if matches!(output.command, CommandKind::CopyContentToCache | CommandKind::SetEula) {
        return Ok(None);
    }
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(output).context("Failed to serialize output")?,
        OutputFormat::Text => output
            .records
            .iter()
            .map(render_record)
            .collect::<Vec<_>>()
            .join("\n"),
    };
    Ok(Some(rendered))
}

fn render_record(record: &Record) -> String {
    match record {
        Record::Update(u) => format!(
            "{:<40} {}  [eula={} downloaded={} installed={} reboot={}]",
            u.update_id,
            u.title,
            yes_no(u.eula_accepted),
            yes_no(u.is_downloaded),
            yes_no(u.is_installed),
            u.installation_behavior.reboot_behavior.tier()
        ),
        Record::History(h) => format!(
            "{}  {:?}  {}  {}",
            h.date.format("%Y-%m-%d %H:%M:%S"),
            h.operation,
            h.result_code,
            h.title
        ),
        Record::RebootRequired { value } => format!("RebootRequired : {}", value),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
