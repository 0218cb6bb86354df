mod common;

use anyhow::Result;
use axum::http::StatusCode;

use common::TestApp;

#[tokio::test]
async fn health_endpoint_reports_db_ok() -> Result<()> {
    let t = TestApp::new().await?;

    let (status, body) = t.send("GET", "/api/health", None, None).await?;
    assert_eq!(status, StatusCode::OK, "health endpoint did not return 200");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["dbOk"], true, "expected dbOk: true, got: {body}");

    Ok(())
}

#[tokio::test]
async fn unknown_route_returns_not_found_envelope() -> Result<()> {
    let t = TestApp::new().await?;

    let (status, body) = t.send("GET", "/api/nope", None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Route not found");

    Ok(())
}
