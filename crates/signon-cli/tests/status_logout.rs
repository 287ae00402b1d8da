use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Creates a temp SIGNON_HOME directory for test isolation.
fn temp_signon_home() -> TempDir {
    TempDir::new().expect("create temp signon home")
}

/// Seeds a cached session the way a completed sign-in would.
fn seed_session(home: &TempDir) {
    fs::write(
        home.path().join("session.json"),
        r#"{"user_id":"user-1","email":"user@example.com","id_token":"tok-1","issued_at":0}"#,
    )
    .expect("seed session cache");
}

#[test]
fn test_status_signed_out() {
    let home = temp_signon_home();

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", home.path())
        .env("SIGNON_API_KEY", "test-key")
        .arg("status")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Signed out."));
}

#[test]
fn test_status_reports_cached_session() {
    let home = temp_signon_home();
    seed_session(&home);

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", home.path())
        .env("SIGNON_API_KEY", "test-key")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed in as user@example.com"));
}

#[test]
fn test_logout_clears_cached_session() {
    let home = temp_signon_home();
    seed_session(&home);

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", home.path())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Signed out"))
        .stdout(predicate::str::contains("Session removed from:"));

    assert!(!home.path().join("session.json").exists());
}

#[test]
fn test_logout_without_session() {
    let home = temp_signon_home();

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", home.path())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in (no cached session)."));
}
