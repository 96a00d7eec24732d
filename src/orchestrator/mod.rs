//! Orchestrator Module
//!
//! One operation per user-facing action. Each validates its own inputs,
//! hands the work to the session's [`UpdateProvider`] and projects the result
//! into a [`CommandOutput`].

pub mod output;
pub mod session;

pub use output::{parse_pipeline, CommandKind, CommandOutput, Record};
pub use session::{DispatchMode, ServerSelection, SessionState};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{CommandError, CommandResult};
use crate::provider::{InstallOutcome, SearchCriteria, UpdateProvider, UpdateSet};

/// Criteria used by `get-update` when none is given
pub const DEFAULT_CRITERIA: &str = "DeploymentAction=* AND Type='Software' AND IsInstalled=0";

/// Number of history entries returned by `get-update-history` by default
pub const DEFAULT_HISTORY_COUNT: i64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub dispatch: DispatchMode,
    /// Fill the diagnostics side channel of every output
    pub verbose: bool,
}

pub struct Orchestrator {
    provider: Arc<dyn UpdateProvider>,
    state: SessionState,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn UpdateProvider>) -> Self {
        Self {
            provider,
            state: SessionState::default(),
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.state
    }

    pub fn options(&self) -> OrchestratorOptions {
        self.options
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.options.verbose = verbose;
    }

    fn output(&self, command: CommandKind) -> CommandOutput {
        CommandOutput::new(command)
    }

    fn verbose(&self, output: &mut CommandOutput, line: impl Into<String>) {
        if self.options.verbose {
            output.diagnostic(line);
        }
    }

    /// Reject empty pipelines and handles minted by another provider instance
    fn check_pipeline(&self, updates: &UpdateSet) -> CommandResult<()> {
        if updates.is_empty() {
            return Err(CommandError::validation("no updates supplied"));
        }
        let own = self.provider.instance_id();
        if let Some(foreign) = updates.iter().find(|u| u.provider_id != own) {
            return Err(CommandError::validation(format!(
                "update '{}' belongs to provider {}, not this session's provider {}",
                foreign.update_id, foreign.provider_id, own
            )));
        }
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────────────────
    // get-update
    // ──────────────────────────────────────────────────────────────────────────

    pub async fn search(
        &mut self,
        criteria: Option<&str>,
        from_remote: bool,
        include_superseded: bool,
    ) -> CommandResult<CommandOutput> {
        let criteria = criteria.unwrap_or(DEFAULT_CRITERIA);
        if criteria.trim().is_empty() {
            return Err(CommandError::validation("search criteria must not be empty"));
        }

        self.state.apply_search_flags(from_remote, include_superseded);
        let request = SearchCriteria {
            criteria: criteria.to_string(),
            include_superseded: self.state.include_superseded,
            use_remote_service: self.state.uses_remote_service(),
        };

        info!(
            "Searching for updates: '{}' (remote={}, superseded={})",
            request.criteria, request.use_remote_service, request.include_superseded
        );
        let found = self.provider.search(&request).await?;

        let mut output = self.output(CommandKind::GetUpdate);
        for update in &found {
            self.verbose(&mut output, format!("FOUND : {}", update.title));
        }
        output.emit_updates(found);
        Ok(output)
    }

    // ──────────────────────────────────────────────────────────────────────────
    // start-download
    // ──────────────────────────────────────────────────────────────────────────

    pub async fn download(&self, updates: &UpdateSet) -> CommandResult<CommandOutput> {
        self.check_pipeline(updates)?;
        let mut output = self.output(CommandKind::StartDownload);

        let mut selected = UpdateSet::new();
        for update in updates {
            let behavior = update.installation_behavior;
            if update.eula_accepted && !behavior.can_request_user_input && !update.is_downloaded {
                self.verbose(&mut output, format!("DOWNLOAD : {}", update.title));
                selected.push(update.clone());
            } else {
                debug!("Not downloading '{}'", update.title);
            }
        }

        if selected.is_empty() {
            info!("Nothing to download");
            return Ok(output);
        }

        let downloaded = match self.options.dispatch {
            DispatchMode::Batch => self.provider.download(&selected).await?,
            DispatchMode::Incremental => {
                let mut batch = UpdateSet::new();
                let mut last = UpdateSet::new();
                for update in selected {
                    batch.push(update);
                    last = self.provider.download(&batch).await?;
                }
                last
            }
        };

        info!("Downloaded {} update(s)", downloaded.len());
        output.emit_updates(downloaded);
        Ok(output)
    }

    // ──────────────────────────────────────────────────────────────────────────
    // install-update
    // ──────────────────────────────────────────────────────────────────────────

    pub async fn install(&self, updates: &UpdateSet) -> CommandResult<CommandOutput> {
        self.check_pipeline(updates)?;
        let mut output = self.output(CommandKind::InstallUpdate);

        let mut selected = UpdateSet::new();
        let mut reboot_required = false;
        for update in updates.iter().filter(|u| u.is_downloaded) {
            if update.installation_behavior.reboot_behavior.requires_reboot() {
                reboot_required = true;
            }
            self.verbose(&mut output, format!("INSTALL : {}", update.title));
            selected.push(update.clone());
        }

        if selected.is_empty() {
            info!("Nothing to install");
            return Ok(output);
        }

        let outcome = match self.options.dispatch {
            DispatchMode::Batch => {
                let outcome = self.provider.install(&selected).await?;
                self.report_install(&mut output, &outcome);
                outcome
            }
            DispatchMode::Incremental => {
                let mut batch = UpdateSet::new();
                let mut last = None;
                for update in selected {
                    batch.push(update);
                    let outcome = self.provider.install(&batch).await?;
                    self.report_install(&mut output, &outcome);
                    last = Some(outcome);
                }
                match last {
                    Some(outcome) => outcome,
                    None => return Ok(output),
                }
            }
        };

        info!("Installed {} update(s), reboot required: {}", outcome.installed.len(), reboot_required);
        output.emit_updates(outcome.installed);
        if reboot_required {
            output.emit(Record::RebootRequired { value: true });
        }
        Ok(output)
    }

    fn report_install(&self, output: &mut CommandOutput, outcome: &InstallOutcome) {
        self.verbose(
            output,
            format!("RESULT : {} (0x{:08X})", outcome.result_code, outcome.hresult),
        );
    }

    // ──────────────────────────────────────────────────────────────────────────
    // get-update-history
    // ──────────────────────────────────────────────────────────────────────────

    pub async fn history(&self, start_index: i64, count: i64) -> CommandResult<CommandOutput> {
        if count < 0 {
            return Err(CommandError::validation(format!(
                "history count must not be negative (got {})",
                count
            )));
        }

        let total = self.provider.total_history_count().await?;
        let count = (count as u64).min(total as u64) as usize;
        let start = start_index.max(0) as usize;
        debug!("Querying history window start={} count={} (total {})", start, count, total);

        let entries = self.provider.query_history(start, count).await?;

        let mut output = self.output(CommandKind::GetUpdateHistory);
        for entry in entries.into_iter().take(count) {
            output.emit(Record::History(entry));
        }
        Ok(output)
    }

    // ──────────────────────────────────────────────────────────────────────────
    // copy-content-to-cache
    // ──────────────────────────────────────────────────────────────────────────

    pub async fn stage_content(&self, file_paths: &[PathBuf], updates: &UpdateSet) -> CommandResult<CommandOutput> {
        if updates.len() != 1 {
            return Err(CommandError::Cardinality {
                what: "update",
                actual: updates.len(),
            });
        }
        if file_paths.is_empty() {
            return Err(CommandError::validation("at least one content file path is required"));
        }
        if file_paths.iter().any(|p| p.as_os_str().is_empty()) {
            return Err(CommandError::validation("content file paths must not be empty"));
        }
        self.check_pipeline(updates)?;

        let mut output = self.output(CommandKind::CopyContentToCache);
        let Some(update) = updates.first() else {
            return Ok(output);
        };
        if update.is_downloaded {
            debug!("'{}' is already downloaded; nothing to stage", update.title);
            return Ok(output);
        }

        self.verbose(&mut output, format!("PROVISION CONTENT : {}", update.title));
        self.provider.stage_content(update, file_paths).await?;
        info!("Staged {} file(s) for '{}'", file_paths.len(), update.title);
        Ok(output)
    }

    // ──────────────────────────────────────────────────────────────────────────
    // set-eula
    // ──────────────────────────────────────────────────────────────────────────

    pub async fn accept_eula(&self, updates: &UpdateSet, accept: bool) -> CommandResult<CommandOutput> {
        self.check_pipeline(updates)?;
        let mut output = self.output(CommandKind::SetEula);

        if !accept {
            debug!("EULA acceptance not requested; leaving {} update(s) untouched", updates.len());
            return Ok(output);
        }

        let pending: UpdateSet = updates.iter().filter(|u| !u.eula_accepted).cloned().collect();
        if pending.is_empty() {
            return Ok(output);
        }
        for update in &pending {
            self.verbose(&mut output, format!("ACCEPT EULA : {}", update.title));
        }
        self.provider.set_eula_acceptance(&pending, true).await?;
        info!("Accepted EULA for {} update(s)", pending.len());
        Ok(output)
    }
}
