//! Runs the `zsm` binary for commands that need no server.

use std::process::{Command, Output};

use serial_test::serial;

fn zsm(args: &[&str]) -> Output {
    let config_dir = tempfile::TempDir::new().unwrap();
    Command::new(env!("CARGO_BIN_EXE_zsm"))
        .args(args)
        .env("ZSM_CONFIG", config_dir.path().join("config.toml"))
        // Nothing listens here; commands that reach the network fail fast.
        .env("ZSM_API_URL", "http://127.0.0.1:9")
        .env_remove("ZSM_USERNAME")
        .env_remove("ZSM_PASSWORD")
        .output()
        .expect("failed to run zsm")
}

#[test]
#[serial]
fn test_help_lists_commands() {
    let output = zsm(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["console", "deploy", "nodes", "completion"] {
        assert!(
            stdout.contains(command),
            "help should mention '{}'.\nOutput:\n{}",
            command,
            stdout
        );
    }
}

#[test]
#[serial]
fn test_completion_bash() {
    let output = zsm(&["completion", "bash"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("_zsm"), "unexpected completion output:\n{}", stdout);
}

#[test]
#[serial]
fn test_remove_protected_node_is_refused_offline() {
    let output = zsm(&["nodes", "remove", "nuc2", "--force"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("protected node"),
        "expected a protected-node error.\nstderr: {}",
        stderr
    );
}

#[test]
#[serial]
fn test_invalid_config_is_reported() {
    let config_dir = tempfile::TempDir::new().unwrap();
    let path = config_dir.path().join("config.toml");
    std::fs::write(&path, "[timings\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_zsm"))
        .args(["nodes", "list", "-u", "admin", "--password", "admin"])
        .env("ZSM_CONFIG", &path)
        .output()
        .expect("failed to run zsm");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to parse"),
        "expected a config parse error.\nstderr: {}",
        stderr
    );
}

#[test]
#[serial]
fn test_unreachable_server_fails_login() {
    let output = zsm(&["nodes", "list", "-u", "admin", "--password", "admin"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Login failed"), "stderr: {}", stderr);
}
