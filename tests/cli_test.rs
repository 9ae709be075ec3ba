//! CLI integration tests
//!
//! These run the compiled binary and only exercise commands that need no
//! browser: `status`, `revoke`, argument handling, and configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;

mod common;

use autoclerk::auth::token_store::{FileTokenStorage, TokenStorage};
use common::{record, temp_config_file, DOCS, DRIVE};

/// Binary with a clean Autoclerk environment and a config path that does
/// not exist, so defaults apply unless a test says otherwise.
fn autoclerk() -> Command {
    let mut cmd = Command::cargo_bin("autoclerk").unwrap();
    for var in [
        "AUTOCLERK_CLIENT_SECRET",
        "AUTOCLERK_TOKEN_PATH",
        "AUTOCLERK_STORAGE",
        "AUTOCLERK_SCOPES",
        "AUTOCLERK_REDIRECT_PORT",
        "AUTOCLERK_CALLBACK_TIMEOUT",
        "AUTOCLERK_NETWORK_RETRIES",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd.args(["--config", "/nonexistent/autoclerk/config.yaml"]);
    cmd
}

#[test]
fn test_help_lists_commands() {
    autoclerk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("token"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("revoke"));
}

#[test]
fn test_missing_subcommand_fails() {
    Command::cargo_bin("autoclerk").unwrap().assert().failure();
}

#[test]
fn test_status_without_credential() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token.json");

    autoclerk()
        .args(["--token-path", token_path.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no credential"));
}

#[test]
fn test_status_reports_stored_credential_without_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    FileTokenStorage::new(&token_path)
        .atomic_save(&record("A1-secret", Some("R1-secret"), 3600, &[DOCS]))
        .unwrap();

    autoclerk()
        .args(["--token-path", token_path.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"))
        .stdout(predicate::str::contains("Refresh: present"))
        .stdout(predicate::str::contains("A1-secret").not())
        .stdout(predicate::str::contains("R1-secret").not());
}

#[test]
fn test_status_flags_missing_scopes_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    FileTokenStorage::new(&token_path)
        .atomic_save(&record("A1", Some("R1"), 3600, &[DOCS]))
        .unwrap();
    let (_cfg_dir, config_path) = temp_config_file(&format!(
        "auth:\n  token_path: {}\n  scopes:\n    - {DOCS}\n    - {DRIVE}\n",
        token_path.display()
    ));

    let mut cmd = Command::cargo_bin("autoclerk").unwrap();
    cmd.env_remove("AUTOCLERK_TOKEN_PATH")
        .env_remove("AUTOCLERK_SCOPES")
        .env("NO_COLOR", "1")
        .args(["--config", config_path.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Missing:"))
        .stdout(predicate::str::contains(DRIVE));
}

#[test]
fn test_revoke_deletes_stored_credential() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    FileTokenStorage::new(&token_path)
        .atomic_save(&record("A1", Some("R1"), 3600, &[DOCS]))
        .unwrap();

    autoclerk()
        .args(["--token-path", token_path.to_str().unwrap(), "revoke"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed stored credential"));

    assert!(!token_path.exists());

    // Revoking again is not an error.
    autoclerk()
        .args(["--token-path", token_path.to_str().unwrap(), "revoke"])
        .assert()
        .success();
}

#[test]
fn test_token_without_client_secret_fails() {
    let dir = tempfile::tempdir().unwrap();

    autoclerk()
        .args([
            "--client-secret",
            dir.path().join("missing.json").to_str().unwrap(),
            "--token-path",
            dir.path().join("token.json").to_str().unwrap(),
            "token",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid client secret"));
}

#[test]
fn test_zero_timeout_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    autoclerk()
        .args([
            "--timeout",
            "0",
            "--token-path",
            dir.path().join("token.json").to_str().unwrap(),
            "status",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("callback_timeout_seconds"));
}

#[test]
fn test_token_prints_stored_access_token() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    let secret_path = dir.path().join("client_secret.json");
    std::fs::write(
        &secret_path,
        r#"{"installed": {"client_id": "cid",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token"}}"#,
    )
    .unwrap();
    FileTokenStorage::new(&token_path)
        .atomic_save(&record("A1", Some("R1"), 3600, &[DOCS]))
        .unwrap();

    autoclerk()
        .args([
            "--client-secret",
            secret_path.to_str().unwrap(),
            "--token-path",
            token_path.to_str().unwrap(),
            "token",
            "--scope",
            DOCS,
        ])
        .assert()
        .success()
        .stdout("A1\n");
}
