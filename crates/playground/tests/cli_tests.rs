//! Command-line scenarios that do not need a docker daemon

use std::process::{Command, Output};

fn playground(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_playground"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run playground")
}

#[test]
fn test_list_shows_builtin_recipes() {
    let output = playground(&["list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for recipe in ["l1", "opstack", "buildernet"] {
        assert!(stdout.contains(recipe), "missing {recipe} in:\n{stdout}");
    }
}

#[test]
fn test_validate_l1() {
    let output = playground(&["validate", "l1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Recipe valid"));
    assert!(stdout.contains("beacon"));
    assert!(stdout.contains("validator"));
}

#[test]
fn test_validate_unknown_recipe() {
    let output = playground(&["validate", "l3"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load recipe l3"));
}

#[test]
fn test_dry_run_writes_compose_file() {
    let dir = tempfile::tempdir().unwrap();
    let session = dir.path().join("session");
    let output = playground(&[
        "start",
        "l1",
        "--dry-run",
        "--bind-locally",
        "--output",
        session.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(session.join("manifest.json").is_file());
    assert!(session.join("genesis.json").is_file());

    let compose = std::fs::read_to_string(session.join("docker-compose.yaml")).unwrap();
    assert!(compose.contains("127.0.0.1:"));
    assert!(compose.contains("playground.session"));
}

#[test]
fn test_stop_requires_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let output = playground(&["stop", dir.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load the session manifest"));
}
