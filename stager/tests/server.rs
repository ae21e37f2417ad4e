mod common;

use std::sync::Arc;

use app_stager::channel::InboundRequest;
use app_stager::server::serve::router;
use app_stager::server::state::{ServerState, StagingCredentials};
use app_stager::staging::StagingConfig;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::FutureExt;
use secrecy::SecretString;
use staging_wire::StagingRequest;
use tower::ServiceExt;

use common::{app, harness, spawn_async_worker, Harness};

fn router_for(h: &Harness, credentials: Option<StagingCredentials>) -> Router {
    router(Arc::new(ServerState::new(h.stager.clone(), credentials)))
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Worker that uploads its droplet through the HTTP surface, like a real one
fn spawn_http_worker(h: &Harness, router: Router) {
    h.channel.serve("staging", move |inbound: InboundRequest| {
        let router = router.clone();
        async move {
            let request: StagingRequest = inbound.parse_json().unwrap();
            let path = request
                .upload_uri
                .trim_start_matches("http://stager.local:9022")
                .to_string();
            let upload = Request::builder()
                .method("POST")
                .uri(path)
                .body(Body::from("BITS"))
                .unwrap();
            let response = router.oneshot(upload).await.unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);

            inbound
                .replier
                .reply_json(&serde_json::json!({ "task_log": "log-xyz" }))
                .unwrap();
        }
        .boxed()
    });
}

#[tokio::test]
async fn test_health() {
    let h = harness(StagingConfig::default());
    let response = router_for(&h, None)
        .oneshot(request("GET", "/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_stage_unknown_app() {
    let h = harness(StagingConfig::default());
    let response = router_for(&h, None)
        .oneshot(request("POST", "/v1/apps/missing/stage"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stage_through_http() {
    let h = harness(StagingConfig::default());
    h.apps.insert(app("app-1"));
    let router = router_for(&h, None);
    spawn_http_worker(&h, router.clone());

    let response = router
        .clone()
        .oneshot(request("POST", "/v1/apps/app-1/stage"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["droplet_hash"], common::BITS_SHA1);

    let response = router
        .clone()
        .oneshot(request("GET", "/staging/droplets/app-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"BITS");

    let response = router
        .clone()
        .oneshot(request("DELETE", "/v1/apps/app-1/droplet"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router
        .oneshot(request("DELETE", "/v1/apps/app-1/droplet"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stage_failure_is_bad_gateway() {
    let h = harness(common::short_timeouts());
    h.apps.insert(app("app-1"));

    let response = router_for(&h, None)
        .oneshot(request("POST", "/v1/apps/app-1/stage"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("failed to stage application"));
}

#[tokio::test]
async fn test_upload_without_staging_is_rejected() {
    let h = harness(StagingConfig::default());
    let upload = Request::builder()
        .method("POST")
        .uri("/staging/droplets/app-1")
        .body(Body::from("BITS"))
        .unwrap();
    let response = router_for(&h, None).oneshot(upload).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stage_async_through_http() {
    let h = harness(StagingConfig::default());
    h.apps.insert(app("app-1"));
    spawn_async_worker(
        &h,
        serde_json::json!({"task_id": "t1", "streaming_log_url": "http://x/log"}),
    );

    let response = router_for(&h, None)
        .oneshot(request("POST", "/v1/apps/app-1/stage_async"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["task_id"], "t1");
    assert_eq!(body["streaming_log_url"], "http://x/log");
}

#[tokio::test]
async fn test_staging_endpoints_require_credentials() {
    let h = harness(StagingConfig::default());
    tokio::fs::create_dir_all(h.tmp.path().join("bits"))
        .await
        .unwrap();
    tokio::fs::write(h.tmp.path().join("bits/app-1.zip"), b"ZIP")
        .await
        .unwrap();

    let router = router_for(
        &h,
        Some(StagingCredentials::new("stager", SecretString::from("s3cret"))),
    );

    let response = router
        .clone()
        .oneshot(request("GET", "/staging/apps/app-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let authorized = Request::builder()
        .method("GET")
        .uri("/staging/apps/app-1")
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", BASE64.encode("stager:s3cret")),
        )
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(authorized).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ZIP");
}
