use std::io::Cursor;
use std::sync::Arc;
use tempfile::tempdir;

use wuactl::config::OutputFormat;
use wuactl::orchestrator::{Orchestrator, OrchestratorOptions, ServerSelection};
use wuactl::provider::{Catalog, CatalogProvider, CatalogUpdate, RebootBehavior};
use wuactl::shell::Shell;

fn catalog() -> Catalog {
    let mut ready = CatalogUpdate::new("kb-ready", "Ready Update");
    ready.eula_accepted = true;
    ready.installation_behavior.reboot_behavior = RebootBehavior::AlwaysRequiresReboot;

    let licensed = CatalogUpdate::new("kb-licensed", "Needs License");

    Catalog::new().with_updates(vec![ready, licensed])
}

fn shell_over(catalog: Catalog, format: OutputFormat) -> Shell {
    let orchestrator = Orchestrator::new(Arc::new(CatalogProvider::in_memory(catalog)))
        .with_options(OrchestratorOptions::default());
    Shell::new(orchestrator, format)
}

async fn run(shell: &mut Shell, script: &str) -> String {
    let mut out = Vec::new();
    shell.run(Cursor::new(script.as_bytes()), &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_previous_output_feeds_next_command() {
    let mut shell = shell_over(catalog(), OutputFormat::Text);

    let transcript = run(
        &mut shell,
        "get-update\nset-eula\nget-update\nstart-download\ninstall-update\nget-update-history\nquit\n",
    )
    .await;

    assert_eq!(shell.current().ids(), vec!["kb-ready", "kb-licensed"]);
    assert!(shell.current().iter().all(|u| u.is_installed));
    assert!(transcript.contains("RebootRequired : true"));
    assert_eq!(transcript.matches("Installation").count(), 2, "{}", transcript);
    assert!(!transcript.contains("error:"), "{}", transcript);
}

#[tokio::test]
async fn test_void_commands_keep_current_updates() {
    let mut shell = shell_over(catalog(), OutputFormat::Json);

    run(&mut shell, "get-update\nset-eula --accept false\n").await;

    assert_eq!(shell.current().len(), 2);
}

#[tokio::test]
async fn test_search_flags_stick_across_lines() {
    let mut shell = shell_over(catalog(), OutputFormat::Text);

    let transcript = run(
        &mut shell,
        "get-update --from-remote-service --include-superseded\nget-update\nsession\n",
    )
    .await;

    let session = shell.orchestrator().session();
    assert_eq!(session.server_selection, ServerSelection::Remote);
    assert!(session.include_superseded);
    assert!(transcript.contains("server selection: Remote"));
}

#[tokio::test]
async fn test_errors_do_not_end_the_shell() {
    let mut shell = shell_over(catalog(), OutputFormat::Text);

    let transcript = run(
        &mut shell,
        "start-download\nfrobnicate\nget-update --criteria \"IsInstalled=maybe\"\nget-update\nupdates\n",
    )
    .await;

    assert!(transcript.contains("error: validation error: no updates supplied"));
    assert!(transcript.contains("malformed search criteria"));
    assert!(transcript.contains("kb-licensed"));
    assert_eq!(shell.current().len(), 2);
}

#[tokio::test]
async fn test_stdin_input_rejected_inside_shell() {
    let mut shell = shell_over(catalog(), OutputFormat::Text);

    let transcript = run(&mut shell, "get-update\nstart-download --input -\nsession\n").await;

    assert!(transcript.contains("error: '--input -' reads standard input"), "{}", transcript);
    assert!(transcript.contains("server selection: Default"), "{}", transcript);
    assert_eq!(shell.current().len(), 2);
}

#[tokio::test]
async fn test_clear_and_verbose_flag() {
    let mut shell = shell_over(catalog(), OutputFormat::Text);

    let transcript = run(&mut shell, "get-update -v\nclear\n").await;

    assert!(transcript.contains("VERBOSE: FOUND : Ready Update"));
    assert!(shell.current().is_empty());
    assert!(!shell.orchestrator().options().verbose);
}

#[tokio::test]
async fn test_pipeline_input_file() {
    let catalog = catalog();
    let mut staged_shell = shell_over(catalog.clone(), OutputFormat::Json);
    let dir = tempdir().unwrap();
    let saved = dir.path().join("updates.json");

    let mut producer = Orchestrator::new(Arc::new(CatalogProvider::in_memory(catalog)));
    let found = producer.search(None, false, false).await.unwrap();
    std::fs::write(&saved, serde_json::to_string(&found).unwrap()).unwrap();

    let transcript = run(&mut staged_shell, &format!("start-download --input {}\n", saved.display())).await;

    assert!(!transcript.contains("error:"), "{}", transcript);
    assert_eq!(staged_shell.current().ids(), vec!["kb-ready"]);
}
