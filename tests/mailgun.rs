//! Mailgun sender against a local stand-in for the messages endpoint

use axum::{extract::State, http::StatusCode, routing::post, Form, Router};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use upflo::email::{EmailSender, MailgunSender};
use upflo::WorkflowError;

type Received = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn spawn_mailgun(status: StatusCode) -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route(
            "/v3/mg.example.com/messages",
            post(
                move |State(received): State<Received>,
                      Form(form): Form<HashMap<String, String>>| async move {
                    received.lock().unwrap().push(form);
                    (status, "{\"message\":\"Queued. Thank you.\"}")
                },
            ),
        )
        .with_state(received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), received)
}

#[tokio::test]
async fn posts_message_form() {
    let (base, received) = spawn_mailgun(StatusCode::OK).await;
    let sender = MailgunSender::new(&base, "mg.example.com", "key-123", "team@example.com");

    sender.send("ada@example.com", "Welcome", "Hi Ada").await.unwrap();

    let forms = received.lock().unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0]["to"], "ada@example.com");
    assert_eq!(forms[0]["from"], "team@example.com");
    assert_eq!(forms[0]["subject"], "Welcome");
    assert_eq!(forms[0]["text"], "Hi Ada");
}

#[tokio::test]
async fn non_success_status_is_a_send_error() {
    let (base, _) = spawn_mailgun(StatusCode::INTERNAL_SERVER_ERROR).await;
    let sender = MailgunSender::new(&base, "mg.example.com", "key-123", "team@example.com");

    let err = sender.send("ada@example.com", "Welcome", "Hi Ada").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Send(_)));
}
