//! End-to-end link-email runs against a mock identity endpoint.

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

fn seed_session(signon_home: &TempDir) {
    std::fs::write(
        signon_home.path().join("session.json"),
        r#"{"user_id":"user-1","email":"user@example.com","id_token":"tok-1","issued_at":0}"#,
    )
    .unwrap();
}

#[tokio::test]
async fn test_link_email_sends_verification() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let signon_home = temp_signon_home();
    seed_session(&signon_home);
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:sendOobCode"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "requestType": "VERIFY_AND_CHANGE_EMAIL",
            "idToken": "tok-1",
            "newEmail": "new@example.com",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "email": "new@example.com",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .env("SIGNON_API_KEY", "test-key")
        .env("SIGNON_BASE_URL", mock_server.uri())
        .args(["link-email", "new@example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Verification email sent. Confirm it, then sign in again.",
        ));
}

#[tokio::test]
async fn test_link_email_reports_provider_rejection() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let signon_home = temp_signon_home();
    seed_session(&signon_home);
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:sendOobCode"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "INVALID_ID_TOKEN" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .env("SIGNON_API_KEY", "test-key")
        .env("SIGNON_BASE_URL", mock_server.uri())
        .args(["link-email", "new@example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not link email:"))
        .stderr(predicate::str::contains("INVALID_ID_TOKEN"));
}

#[test]
fn test_link_email_requires_a_session() {
    let signon_home = temp_signon_home();

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .env("SIGNON_API_KEY", "test-key")
        .args(["link-email", "new@example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not signed in"));
}

#[test]
fn test_link_email_rejects_malformed_address() {
    let signon_home = temp_signon_home();

    cargo_bin_cmd!("signon")
        .env("SIGNON_HOME", signon_home.path())
        .arg("link-email")
        .arg("not-an-address")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "'not-an-address' is not a well-formed email address",
        ));
}
