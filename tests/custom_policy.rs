mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::util::ServiceExt;

use common::TestApp;
use taskhub::authz::{Action, Decision, DefaultPolicyEvaluator, DenyReason, PolicyEvaluator, Principal};
use taskhub::config::{AppConfig, Environment};
use taskhub::jwt::JwtConfig;
use taskhub::{build_router, AppState};

/// Read-only deployment: everything the default rules allow, except deletions.
struct NoDeletes;

impl PolicyEvaluator for NoDeletes {
    fn evaluate(&self, principal: &Principal, action: &Action<'_>) -> Decision {
        match action {
            Action::DeleteProject(_) | Action::DeleteTask(_) | Action::DeleteUser { .. } => {
                Decision::Deny(DenyReason::RoleRequired { required: "Nobody" })
            }
            _ => DefaultPolicyEvaluator::new().evaluate(principal, action),
        }
    }
}

#[tokio::test]
async fn handlers_consult_the_injected_evaluator() -> Result<()> {
    let mut t = TestApp::new().await?;
    let alice = t.register("alice").await?;
    let project = t.create_project(&alice, "Keep me", &[]).await?;

    let config = AppConfig::new(JwtConfig::new("test-secret", 24));
    let state = AppState::new(t.pool.clone(), config).with_policy(Arc::new(NoDeletes));
    t.app = build_router(state)?;

    let (status, body) = t.delete(&format!("/api/projects/{project}"), &alice).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied. Nobody role required.");

    let (status, _) = t
        .put(&format!("/api/projects/{project}"), &alice, json!({ "title": "Renamed" }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn cors_and_docs_follow_config() -> Result<()> {
    let t = TestApp::new().await?;

    let config = AppConfig::new(JwtConfig::new("test-secret", 24))
        .with_port(6100)
        .with_cors_origins(["http://app.local".to_string()]);
    let app = build_router(AppState::new(t.pool.clone(), config))?;

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/api/projects")
        .header("origin", "http://app.local")
        .header("access-control-request-method", "POST")
        .body(Body::empty())?;
    let resp = app.clone().oneshot(preflight).await?;
    assert_eq!(
        resp.headers().get("access-control-allow-origin").map(|v| v.as_bytes()),
        Some(&b"http://app.local"[..])
    );
    assert_eq!(
        resp.headers().get("access-control-allow-credentials").map(|v| v.as_bytes()),
        Some(&b"true"[..])
    );

    let req = Request::builder()
        .method("GET")
        .uri("/api-docs/openapi.json")
        .body(Body::empty())?;
    let resp = app.oneshot(req).await?;
    let bytes = axum::body::to_bytes(resp.into_body(), 10_485_760).await?;
    let doc: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(doc["servers"][0]["url"], "http://localhost:6100");

    Ok(())
}

#[tokio::test]
async fn error_detail_follows_configured_environment() -> Result<()> {
    let mut t = TestApp::new().await?;
    let alice = t.register("alice").await?;

    let production = AppConfig::new(JwtConfig::new("test-secret", 24)).with_environment(Environment::Production);
    t.app = build_router(AppState::new(t.pool.clone(), production))?;

    let (status, body) = t.send("GET", "/api/nowhere", None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.get("detail").is_none());

    let development = AppConfig::new(JwtConfig::new("test-secret", 24)).with_environment(Environment::Development);
    t.app = build_router(AppState::new(t.pool.clone(), development))?;

    let (status, body) = t.send("GET", "/api/nowhere", None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route not found");
    assert!(body["detail"].as_str().is_some_and(|detail| detail.contains("NotFound")));

    let (status, body) = t.send("GET", "/api/projects", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());

    // successful responses are left alone
    let (status, body) = t.get("/api/auth/me", &alice).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("detail").is_none());

    Ok(())
}
