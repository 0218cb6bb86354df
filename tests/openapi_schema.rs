mod common;

use anyhow::Result;
use axum::http::StatusCode;

use common::TestApp;

#[tokio::test]
async fn openapi_json_is_served_with_bearer_scheme() -> Result<()> {
    let t = TestApp::new().await?;

    let (status, doc) = t.send("GET", "/api-docs/openapi.json", None, None).await?;
    assert_eq!(status, StatusCode::OK);

    let paths = doc["paths"].as_object().expect("paths object");
    for path in ["/api/auth/register", "/api/projects/{id}/stats", "/api/tasks/{id}/status", "/api/users/simple"] {
        assert!(paths.contains_key(path), "missing {path} in {:?}", paths.keys().collect::<Vec<_>>());
    }

    assert_eq!(doc["components"]["securitySchemes"]["bearerAuth"]["type"], "http");
    assert!(doc["components"]["schemas"]["TaskLog"].is_object());

    Ok(())
}
