//! HTTP-surface tests driven through the router in-process.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use photo_pipeline::build_app;
use photo_pipeline::models::job::JobState;

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is json")
}

fn submit_body(record_id: &str) -> Value {
    json!({
        "kind": "face-crop",
        "payload": {
            "record_id": record_id,
            "photo_path": format!("/photos/{record_id}.jpg"),
            "project_id": "proj-1"
        }
    })
}

#[tokio::test]
async fn submit_accepts_and_exposes_the_job() {
    let (queue, app) = build_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/jobs", submit_body("rec-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert_eq!(body["state"], "waiting");
    let job_id: uuid::Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

    let job = queue.get(job_id).expect("job is queued");
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.payload.record_id, "rec-1");
    assert_eq!(job.max_attempts, 1);
}

#[tokio::test]
async fn submit_honors_max_attempts_option() {
    let (queue, app) = build_app();

    let mut body = submit_body("rec-retry");
    body["options"] = json!({ "max_attempts": 3 });
    let response = app.oneshot(post_json("/api/v1/jobs", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    let job_id: uuid::Uuid = body["job_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(queue.get(job_id).unwrap().max_attempts, 3);
}

#[tokio::test]
async fn submit_rejects_invalid_payload() {
    let (queue, app) = build_app();

    let body = json!({
        "kind": "face-crop",
        "payload": { "record_id": "", "photo_path": "a.jpg" }
    });
    let response = app.oneshot(post_json("/api/v1/jobs", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("invalid payload"));
    assert_eq!(queue.counts().total(), 0);
}

#[tokio::test]
async fn submit_rejects_unknown_kind() {
    let (_queue, app) = build_app();

    let body = json!({
        "kind": "sharpen",
        "payload": { "record_id": "r", "photo_path": "a.jpg" }
    });
    let response = app.oneshot(post_json("/api/v1/jobs", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn bulk_submit_queues_every_payload() {
    let (queue, app) = build_app();

    let body = json!({
        "kind": "face-crop",
        "payloads": [
            { "record_id": "a", "photo_path": "a.jpg" },
            { "record_id": "b", "photo_path": "b.jpg" },
            { "record_id": "c", "photo_path": "c.jpg" }
        ]
    });
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/jobs/bulk", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["job_ids"].as_array().unwrap().len(), 3);
    assert_eq!(queue.counts().waiting, 3);
}

#[tokio::test]
async fn bulk_submit_is_all_or_nothing_and_names_the_bad_index() {
    let (queue, app) = build_app();

    let body = json!({
        "kind": "face-crop",
        "payloads": [
            { "record_id": "a", "photo_path": "a.jpg" },
            { "record_id": "", "photo_path": "b.jpg" },
            { "record_id": "c", "photo_path": "c.jpg" }
        ]
    });
    let response = app.oneshot(post_json("/api/v1/jobs/bulk", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("index 1"));
    assert_eq!(queue.counts().total(), 0);
}

#[tokio::test]
async fn status_returns_404_for_unknown_job() {
    let (_queue, app) = build_app();

    let response = app
        .oneshot(get(&format!("/api/v1/jobs/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_reflects_the_queued_job() {
    let (_queue, app) = build_app();

    let submitted = app
        .clone()
        .oneshot(post_json("/api/v1/jobs", submit_body("rec-status")))
        .await
        .unwrap();
    let job_id = body_json(submitted).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(get(&format!("/api/v1/jobs/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["job_id"], job_id.as_str());
    assert_eq!(body["state"], "waiting");
    assert_eq!(body["progress"], 0);
    assert_eq!(body["attempts"], 0);
    assert!(body["result"].is_null());
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn queue_stats_report_per_state_counts() {
    let (_queue, app) = build_app();

    for record in ["s1", "s2"] {
        app.clone()
            .oneshot(post_json("/api/v1/jobs", submit_body(record)))
            .await
            .unwrap();
    }

    let response = app.oneshot(get("/api/v1/queue/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["waiting"], 2);
    assert_eq!(body["active"], 0);
    assert_eq!(body["completed"], 0);
    assert_eq!(body["failed"], 0);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn health_reports_status_and_queue_counts() {
    let (_queue, app) = build_app();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["queue"]["waiting"], 0);
}
