mod common;

use common::{test_config, TestApp};
use guardian_agent::config::FailPolicy;
use guardian_agent::models::Verdict;
use guardian_agent::services::MockRiskClient;
use reqwest::Client;
use serde_json::json;

async fn post_login(app: &TestApp, body: serde_json::Value) -> reqwest::Response {
    Client::new()
        .post(format!("{}/hooks/login", app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request")
}

fn alice_login() -> serde_json::Value {
    json!({
        "username": "alice",
        "email": "alice@example.com",
        "ip": "203.0.113.9",
        "user_agent": "Mozilla/5.0"
    })
}

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;

    let response = Client::new()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "guardian-agent-test");
}

#[tokio::test]
async fn allowed_login_continues() {
    let app = TestApp::spawn_with(
        MockRiskClient::with_verdict(Verdict::Allow),
        test_config(true, FailPolicy::Closed),
    )
    .await;
    app.seed_credentials().await;

    let response = post_login(&app, alice_login()).await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["decision"], "allow");
    assert_eq!(body["force_logout"], false);
    assert!(body.get("redirect").is_none());
    assert_eq!(app.client.check_count(), 1);
}

#[tokio::test]
async fn blocked_login_forces_logout_without_confirmation() {
    let app = TestApp::spawn_with(
        MockRiskClient::with_verdict(Verdict::Block),
        test_config(true, FailPolicy::Open),
    )
    .await;
    app.seed_credentials().await;

    let response = post_login(&app, alice_login()).await;
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["decision"], "block");
    assert_eq!(body["force_logout"], true);
    assert_eq!(body["redirect"], "http://localhost:8080/");
}

#[tokio::test]
async fn passive_mode_always_allows() {
    let app = TestApp::spawn_with(
        MockRiskClient::with_verdict(Verdict::Block),
        test_config(false, FailPolicy::Closed),
    )
    .await;
    app.seed_credentials().await;

    let response = post_login(&app, alice_login()).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["decision"], "allow");
    assert_eq!(app.client.check_count(), 0);
}

#[tokio::test]
async fn remote_failure_honours_fail_policy() {
    let closed = TestApp::spawn_with(
        MockRiskClient::failing(),
        test_config(true, FailPolicy::Closed),
    )
    .await;
    closed.seed_credentials().await;

    let body: serde_json::Value = post_login(&closed, alice_login())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["decision"], "block");

    let open = TestApp::spawn_with(
        MockRiskClient::failing(),
        test_config(true, FailPolicy::Open),
    )
    .await;
    open.seed_credentials().await;

    let body: serde_json::Value = post_login(&open, alice_login())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["decision"], "allow");
}

#[tokio::test]
async fn unregistered_agent_lets_logins_through() {
    let app = TestApp::spawn_with(
        MockRiskClient::with_verdict(Verdict::Block),
        test_config(true, FailPolicy::Closed),
    )
    .await;

    let body: serde_json::Value = post_login(&app, alice_login()).await.json().await.unwrap();
    assert_eq!(body["decision"], "allow");
    assert_eq!(app.client.check_count(), 0);
}

#[tokio::test]
async fn invalid_login_payload_is_rejected() {
    let app = TestApp::spawn().await;
    app.seed_credentials().await;

    let response = post_login(
        &app,
        json!({ "username": "alice", "email": "not-an-email" }),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
}
