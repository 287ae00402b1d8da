//! End-to-end login/signup over the email channel against a mock
//! identity endpoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a temp SIGNON_HOME directory for test isolation.
fn temp_signon_home() -> TempDir {
    TempDir::new().expect("create temp signon home")
}

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

#[tokio::test]
async fn test_login_signs_in_and_caches_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let signon_home = temp_signon_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "email": "user@example.com",
            "password": "hunter42",
            "returnSecureToken": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "user-1",
            "email": "user@example.com",
            "idToken": "id-token-1",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .env("SIGNON_API_KEY", "test-key")
        .env("SIGNON_BASE_URL", mock_server.uri())
        .env("SIGNON_NO_BROWSER", "1")
        .arg("login")
        .write_stdin("user@example.com\nhunter42\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Signed in as user@example.com"));

    let cached = std::fs::read_to_string(signon_home.path().join("session.json")).unwrap();
    assert!(cached.contains("user-1"));
    assert!(cached.contains("id-token-1"));
}

#[tokio::test]
async fn test_login_reports_rejected_password() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let signon_home = temp_signon_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "INVALID_PASSWORD" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    // After the rejection the prompt comes back; EOF ends the flow.
    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .env("SIGNON_API_KEY", "test-key")
        .env("SIGNON_BASE_URL", mock_server.uri())
        .env("SIGNON_NO_BROWSER", "1")
        .arg("login")
        .write_stdin("user@example.com\nwrong-pass\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Aborted."))
        .stderr(predicate::str::contains("INVALID_PASSWORD"));

    assert!(!signon_home.path().join("session.json").exists());
}

#[tokio::test]
async fn test_signup_creates_account() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let signon_home = temp_signon_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signUp"))
        .and(body_partial_json(json!({
            "email": "new@example.com",
            "password": "hunter42",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "new-user",
            "email": "new@example.com",
            "idToken": "id-token-2",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .env("SIGNON_API_KEY", "test-key")
        .env("SIGNON_BASE_URL", mock_server.uri())
        .env("SIGNON_NO_BROWSER", "1")
        .arg("signup")
        .write_stdin("new@example.com\nhunter42\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Account created for new@example.com"));
}

#[test]
fn test_login_when_already_signed_in() {
    let signon_home = temp_signon_home();
    std::fs::write(
        signon_home.path().join("session.json"),
        r#"{"user_id":"user-1","email":"user@example.com","id_token":"tok-1","issued_at":0}"#,
    )
    .unwrap();

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .env("SIGNON_API_KEY", "test-key")
        .arg("login")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Already signed in as user@example.com.",
        ));
}

#[test]
fn test_login_hints_at_invalid_credentials() {
    let signon_home = temp_signon_home();

    // Bad address and short password never reach the provider; the
    // hint comes back and EOF ends the flow.
    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .env("SIGNON_API_KEY", "test-key")
        .arg("login")
        .write_stdin("not-an-email\nabc\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Aborted."))
        .stderr(predicate::str::contains("at least 6 characters"));
}
