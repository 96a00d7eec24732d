//! Interactive shell
//!
//! Keeps one orchestrator (and therefore one session state) alive across
//! commands. The updates emitted by the last search, download or install are
//! the implicit input of the next command that consumes updates.

use anyhow::{bail, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use tracing::debug;

use crate::cli::{read_pipeline, render, UpdateCommand};
use crate::config::OutputFormat;
use crate::orchestrator::{CommandKind, Orchestrator};
use crate::provider::UpdateSet;

/// One line typed at the prompt
#[derive(Parser, Debug)]
#[command(name = "wuactl", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    /// Emit diagnostic lines for this command
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: UpdateCommand,
}

const HELP: &str = "\
Commands:
  get-update [--criteria <C>] [--from-remote-service] [--include-superseded]
  start-download                 download the current updates
  install-update                 install the current updates
  get-update-history [--start-index N] [--count N]
  copy-content-to-cache --file-path <P>...
  set-eula [--accept true|false]
  updates                        show the current updates
  session                        show the session state
  clear                          forget the current updates
  help                           this text
  quit | exit                    leave the shell
Append -v to a command for diagnostic output, --input <file> to read updates from a file.";

pub struct Shell {
    orchestrator: Orchestrator,
    format: OutputFormat,
    verbose: bool,
    current: UpdateSet,
}

impl Shell {
    pub fn new(orchestrator: Orchestrator, format: OutputFormat) -> Self {
        let verbose = orchestrator.options().verbose;
        Self {
            orchestrator,
            format,
            verbose,
            current: UpdateSet::new(),
        }
    }

    /// Updates that the next consuming command will receive
    pub fn current(&self) -> &UpdateSet {
        &self.current
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Read commands from `input` until EOF or `quit`
    pub async fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> Result<()> {
        writeln!(out, "wuactl interactive shell. Type 'help' for commands, 'quit' to leave.")?;

        loop {
            write!(out, "wuactl> ")?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match line.to_lowercase().as_str() {
                "quit" | "exit" | "q" => break,
                "help" => {
                    writeln!(out, "{}", HELP)?;
                    continue;
                }
                "session" => {
                    let state = self.orchestrator.session();
                    writeln!(
                        out,
                        "server selection: {:?}\ninclude superseded: {}\ndispatch: {}\ncurrent updates: {}",
                        state.server_selection,
                        state.include_superseded,
                        self.orchestrator.options().dispatch,
                        self.current.len()
                    )?;
                    continue;
                }
                "updates" => {
                    for update in &self.current {
                        writeln!(out, "  {}", update)?;
                    }
                    continue;
                }
                "clear" => {
                    self.current = UpdateSet::new();
                    continue;
                }
                _ => {}
            }

            if let Err(e) = self.execute_line(line, &mut out).await {
                writeln!(out, "error: {:#}", e)?;
            }
        }

        Ok(())
    }

    async fn execute_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<()> {
        let words = shlex::split(line).ok_or_else(|| anyhow::anyhow!("unbalanced quotes in '{}'", line))?;
        let parsed = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed,
            Err(e) => {
                write!(out, "{}", e.render())?;
                return Ok(());
            }
        };

        let updates = match parsed.command.pipeline() {
            Some(args) => match &args.input {
                Some(path) if path.as_os_str() == "-" => {
                    bail!("'--input -' reads standard input, which the shell is using; give a file path")
                }
                Some(path) => read_pipeline(Some(path))?,
                None => self.current.clone(),
            },
            None => UpdateSet::new(),
        };
        debug!("Running '{}' with {} piped update(s)", parsed.command.kind(), updates.len());

        self.orchestrator.set_verbose(self.verbose || parsed.verbose);
        let result = parsed.command.execute(&mut self.orchestrator, updates).await;
        self.orchestrator.set_verbose(self.verbose);
        let output = result?;

        for line in &output.diagnostics {
            writeln!(out, "VERBOSE: {}", line)?;
        }
        if let Some(rendered) = render(&output, self.format)? {
            if !rendered.is_empty() {
                writeln!(out, "{}", rendered)?;
            }
        }

        if matches!(
            output.command,
            CommandKind::GetUpdate | CommandKind::StartDownload | CommandKind::InstallUpdate
        ) {
            self.current = output.updates();
        }
        Ok(())
    }
}
