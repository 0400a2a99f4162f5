//! HTTP API driven over a real socket

use serde_json::{json, Value};
use std::sync::Arc;
use upflo::api::AppState;
use upflo::server::create_app;
use upflo::store::MemoryStore;
use upflo::WorkflowService;

async fn spawn_app() -> String {
    let state = AppState {
        service: WorkflowService::new(Arc::new(MemoryStore::new())),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_app(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn onboarding() -> Value {
    json!({
        "name": "Onboarding",
        "description": "welcome sequence",
        "email_events": [
            {
                "send_delay_secs": 0,
                "subject": "Welcome",
                "body": "Hi",
                "send_from": "team@example.com"
            },
            {
                "send_delay_secs": 86400,
                "subject": "Day 2",
                "body": "Tips",
                "send_from": "team@example.com"
            }
        ]
    })
}

#[tokio::test]
async fn healthz_answers_ok() {
    let base = spawn_app().await;
    let body = reqwest::get(format!("{}/healthz", base)).await.unwrap().text().await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn workflow_crud_round_trip() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let workflows_url = format!("{}/api/workflows", base);
    let resp = client.post(&workflows_url).json(&onboarding()).send().await.unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["email_events"].as_array().unwrap().len(), 2);

    let listed: Value = client.get(&workflows_url).send().await.unwrap().json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let fetched: Value = client
        .get(format!("{}/api/workflows/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["name"], "Onboarding");

    let resp = client.delete(format!("{}/api/workflows/{}", base, id)).send().await.unwrap();
    assert_eq!(resp.status(), 204);
    let resp = client.get(format!("{}/api/workflows/{}", base, id)).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn invalid_workflows_are_rejected() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let workflows_url = format!("{}/api/workflows", base);

    let no_events = json!({ "name": "Empty", "description": "", "email_events": [] });
    let resp = client.post(&workflows_url).json(&no_events).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    client.post(&workflows_url).json(&onboarding()).send().await.unwrap();
    let resp = client.post(&workflows_url).json(&onboarding()).send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn start_and_unsubscribe_contact() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{}/api/workflows", base))
        .json(&onboarding())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/api/workflows/{}/start", base, id))
        .json(&json!({ "email": "ada@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/api/contacts", base))
        .json(&json!({ "first_name": "Ada", "last_name": "Lovelace", "email": "ada@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let started: Value = client
        .post(format!("{}/api/workflows/{}/start", base, id))
        .json(&json!({ "email": "ada@example.com" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(started["scheduled"], 2);

    let unsubscribe = |email: &'static str| {
        let client = client.clone();
        let url = format!("{}/api/unsubscribe", base);
        async move {
            client
                .post(url)
                .json(&json!({ "email": email }))
                .send()
                .await
                .unwrap()
                .json::<Value>()
                .await
                .unwrap()
        }
    };
    assert_eq!(unsubscribe("ada@example.com").await["removed"], 2);
    assert_eq!(unsubscribe("ada@example.com").await["removed"], 0);
}
