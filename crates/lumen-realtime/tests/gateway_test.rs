//! Gateway integration tests: upgrade authentication, the job API, and
//! owner-scoped relay of processing events.

mod common;

use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Request, StatusCode};
use common::{get, json_body, post_json, TestApp};
use lumen_jobs::{EventBus, Outcome, WorkQueue};
use lumen_realtime::Session;
use serde_json::json;
use std::time::Duration;

async fn next_update(session: &mut Session) -> Option<serde_json::Value> {
    match tokio::time::timeout(Duration::from_secs(1), session.outbound.recv()).await {
        Ok(Some(Message::Text(text))) => Some(serde_json::from_str(&text).expect("frame json")),
        _ => None,
    }
}

#[tokio::test]
async fn upgrade_without_credential_is_rejected() {
    let app = TestApp::new().await;
    let response = app.send(get("/ws", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "MISSING_CREDENTIAL");
    assert_eq!(app.gateway.session_count().await, 0);
}

#[tokio::test]
async fn upgrade_with_invalid_credential_is_rejected() {
    let app = TestApp::new().await;
    let response = app.send(get("/ws?token=forged", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "INVALID_CREDENTIAL");
}

#[tokio::test]
async fn valid_credential_without_upgrade_headers_needs_upgrade() {
    let app = TestApp::new().await;
    let token = app.token("u1");
    let request = Request::get("/ws")
        .header("cookie", format!("token={token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
}

#[tokio::test]
async fn job_api_requires_a_token() {
    let app = TestApp::new().await;
    let response = app.send(get("/api/v1/jobs", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submit_is_idempotent_and_listing_is_per_owner() {
    let app = TestApp::new().await;
    let alice = app.token("alice");
    let bob = app.token("bob");
    let body = json!({
        "jobId": "j1",
        "inputRef": "alice/cat.png",
        "mediaKind": "image/png"
    });

    let first = app.send(post_json("/api/v1/jobs", Some(&alice), &body)).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = json_body(first).await;
    assert_eq!(first["data"]["jobId"], "j1");
    assert_eq!(first["data"]["filename"], "cat.png");
    assert_eq!(first["data"]["status"], "queued");

    let again = app.send(post_json("/api/v1/jobs", Some(&alice), &body)).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(app.queue.pending_count().await.unwrap(), 1);

    let listed = json_body(app.send(get("/api/v1/jobs", Some(&alice))).await).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let listed = json_body(app.send(get("/api/v1/jobs", Some(&bob))).await).await;
    assert!(listed["data"].as_array().unwrap().is_empty());

    let hidden = app.send(get("/api/v1/jobs/j1", Some(&bob))).await;
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submit_refuses_another_owners_upload() {
    let app = TestApp::new().await;
    let alice = app.token("alice");

    for input in ["bob/cat.png", "/srv/uploads/bob/cat.png", "alice/../bob/cat.png"] {
        let body = json!({ "jobId": "j1", "inputRef": input, "mediaKind": "image" });
        let response = app.send(post_json("/api/v1/jobs", Some(&alice), &body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{input}");
    }
    assert_eq!(app.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn submit_generates_job_id_when_absent() {
    let app = TestApp::new().await;
    let token = app.token("alice");
    let body = json!({ "inputRef": "alice/a.png", "mediaKind": "image" });

    let response = app.send(post_json("/api/v1/jobs", Some(&token), &body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let job_id = json_body(response).await["data"]["jobId"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(!job_id.is_empty());
}

#[tokio::test]
async fn processing_updates_reach_only_the_owner() {
    let app = TestApp::new().await;
    let alice = app.token("alice");

    let mut alice_tab = app.gateway.connect(Some(&alice)).await.unwrap();
    let mut alice_other_tab = app.gateway.connect(Some(&alice)).await.unwrap();
    let mut bob = app
        .gateway
        .connect(Some(&app.token("bob")))
        .await
        .unwrap();

    let body = json!({ "jobId": "j1", "inputRef": "alice/a.png", "mediaKind": "image" });
    let response = app.send(post_json("/api/v1/jobs", Some(&alice), &body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    assert_eq!(app.process_next().await, Outcome::Completed);

    for session in [&mut alice_tab, &mut alice_other_tab] {
        let processing = next_update(session).await.expect("processing update");
        assert_eq!(processing["event"], "thumbnail:job:update");
        assert_eq!(processing["data"]["status"], "processing");
        assert!(processing["data"]["resultRef"].is_null());
        assert!(processing["data"]["errorMessage"].is_null());
        assert!(processing["data"]
            .as_object()
            .unwrap()
            .contains_key("resultRef"));

        let completed = next_update(session).await.expect("completed update");
        assert_eq!(completed["data"]["jobId"], "j1");
        assert_eq!(completed["data"]["status"], "completed");
        assert_eq!(
            completed["data"]["resultRef"],
            "/uploads/thumbnails/alice/j1.webp"
        );
        assert!(completed["data"].get("ownerId").is_none());
    }

    assert!(next_update(&mut bob).await.is_none());
}

#[tokio::test]
async fn events_for_disconnected_owner_are_dropped() {
    let app = TestApp::new().await;
    let alice = app.token("alice");
    let session = app.gateway.connect(Some(&alice)).await.unwrap();
    app.gateway.leave(&session.owner_id, &session.id).await;

    let event = lumen_core::JobEvent {
        job_id: "j9".into(),
        owner_id: "alice".into(),
        status: lumen_core::JobStatus::Completed,
        result_ref: None,
        error_message: None,
    };
    app.bus.publish(&event).await.unwrap();
    assert_eq!(app.gateway.relay(&event).await, 0);
}
