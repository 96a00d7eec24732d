//! wuactl - update agent command shell
//!
//! Runs one update command per invocation (pipe JSON output from one command
//! into the next), or an interactive shell that keeps the session alive.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wuactl::cli::{read_pipeline, render, Cli, Command};
use wuactl::config::ShellConfig;
use wuactl::orchestrator::{Orchestrator, OrchestratorOptions};
use wuactl::provider::{Catalog, CatalogProvider};
use wuactl::shell::Shell;
use wuactl::UpdateSet;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = ShellConfig::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);

    // Initialize logging; stdout is reserved for command output
    let default_filter = if config.verbose { "wuactl=debug" } else { "wuactl=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Command::NewCatalog { force } => {
            let catalog = Catalog::new();
            CatalogProvider::create(&config.catalog, &catalog, force)
                .await
                .with_context(|| format!("Failed to create catalog '{}'", config.catalog.display()))?;
            info!("Created catalog {} at '{}'", catalog.id, config.catalog.display());
            println!("{}", catalog.id);
        }
        Command::Shell => {
            let orchestrator = open_orchestrator(&config).await?;
            let mut shell = Shell::new(orchestrator, config.format);
            let stdin = io::stdin();
            shell.run(stdin.lock(), io::stdout()).await?;
        }
        Command::Update(command) => {
            let mut orchestrator = open_orchestrator(&config).await?;
            let updates = match command.pipeline() {
                Some(args) => read_pipeline(args.input.as_deref())?,
                None => UpdateSet::new(),
            };

            let output = command.execute(&mut orchestrator, updates).await?;

            let mut stderr = io::stderr();
            for line in &output.diagnostics {
                writeln!(stderr, "VERBOSE: {}", line)?;
            }
            if let Some(rendered) = render(&output, config.format)? {
                if !rendered.is_empty() {
                    println!("{}", rendered);
                }
            }
        }
    }

    Ok(())
}

async fn open_orchestrator(config: &ShellConfig) -> Result<Orchestrator> {
    let provider = CatalogProvider::open(&config.catalog)
        .await
        .with_context(|| format!("Failed to open update catalog '{}'", config.catalog.display()))?;
    Ok(Orchestrator::new(Arc::new(provider)).with_options(OrchestratorOptions {
        dispatch: config.dispatch,
        verbose: config.verbose,
    }))
}
