mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::*;
use dine_sync::AppState;
use dine_sync::adapters::router::{BODY_LIMIT, build_router};
use dine_sync::infra::notify_hub::BroadcastHub;
use std::time::Duration;
use tower::ServiceExt;

fn router(env: &TestEnv) -> axum::Router {
    let state = AppState {
        engine: env.engine.clone(),
        hub: BroadcastHub::new(16),
    };
    build_router(state, Duration::from_secs(5))
}

#[tokio::test]
async fn health_route_answers_ok() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 64).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let env = TestEnv::new();
    let payload = format!("{{\"pad\":\"{}\"}}", "x".repeat(BODY_LIMIT));
    let response = router(&env)
        .oneshot(
            Request::post("/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
