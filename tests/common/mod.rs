#![allow(dead_code)]

use std::path::Path;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use taskhub::config::AppConfig;
use taskhub::create_app_with_config;
use taskhub::jwt::JwtConfig;

pub const PASSWORD: &str = "password123";

/// Router over a fresh migrated SQLite file that lives as long as the value.
pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create tempdir")?;
        let opts = SqliteConnectOptions::new()
            .filename(dir.path().join("test.db"))
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(opts).await?;

        let migrator =
            sqlx::migrate::Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
        migrator.run(&pool).await?;

        let config = AppConfig::new(JwtConfig::new("test-secret", 24));
        let app = create_app_with_config(pool.clone(), config)?;

        Ok(Self { app, pool, _dir: dir })
    }

    /// Sends a request and returns the status with the parsed JSON body (`Null` when empty).
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .with_context(|| format!("non-JSON body: {}", String::from_utf8_lossy(&bytes)))?
        };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str, user: &TestUser) -> Result<(StatusCode, Value)> {
        self.send("GET", uri, Some(&user.token), None).await
    }

    pub async fn post(&self, uri: &str, user: &TestUser, body: Value) -> Result<(StatusCode, Value)> {
        self.send("POST", uri, Some(&user.token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: &TestUser, body: Value) -> Result<(StatusCode, Value)> {
        self.send("PUT", uri, Some(&user.token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, user: &TestUser, body: Value) -> Result<(StatusCode, Value)> {
        self.send("PATCH", uri, Some(&user.token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: &TestUser) -> Result<(StatusCode, Value)> {
        self.send("DELETE", uri, Some(&user.token), None).await
    }

    /// Registers `<username>@example.com` with [`PASSWORD`].
    pub async fn register(&self, username: &str) -> Result<TestUser> {
        let body = serde_json::json!({
            "username": username,
            "name": format!("{username} Tester"),
            "email": format!("{username}@example.com"),
            "password": PASSWORD,
        });
        let (status, value) = self.send("POST", "/api/auth/register", None, Some(body)).await?;
        if status != StatusCode::CREATED {
            anyhow::bail!("register {username} failed: {status} - {value}");
        }

        Ok(TestUser {
            id: value["data"]["user"]["id"].as_str().context("missing user id")?.to_string(),
            token: value["data"]["token"].as_str().context("missing token")?.to_string(),
        })
    }

    /// Changes the stored role directly; the next request sees it.
    pub async fn set_role(&self, user: &TestUser, role: &str) -> Result<()> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role)
            .bind(Uuid::parse_str(&user.id)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn user_with_role(&self, username: &str, role: &str) -> Result<TestUser> {
        let user = self.register(username).await?;
        self.set_role(&user, role).await?;
        Ok(user)
    }

    pub async fn create_project(&self, owner: &TestUser, title: &str, members: &[&TestUser]) -> Result<String> {
        let members: Vec<&str> = members.iter().map(|member| member.id.as_str()).collect();
        let body = serde_json::json!({
            "title": title,
            "description": format!("{title} description"),
            "members": members,
        });
        let (status, value) = self.post("/api/projects", owner, body).await?;
        if status != StatusCode::CREATED {
            anyhow::bail!("create project failed: {status} - {value}");
        }
        Ok(value["data"]["id"].as_str().context("missing project id")?.to_string())
    }

    /// Creates a task in the project; `extra` fields are merged into the body.
    pub async fn create_task(&self, creator: &TestUser, project_id: &str, extra: Value) -> Result<String> {
        let mut body = serde_json::json!({
            "title": "Write release notes",
            "description": "Summarise the changes",
            "project": project_id,
        });
        if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), extra) {
            target.extend(extra);
        }
        let (status, value) = self.post("/api/tasks", creator, body).await?;
        if status != StatusCode::CREATED {
            anyhow::bail!("create task failed: {status} - {value}");
        }
        Ok(value["data"]["id"].as_str().context("missing task id")?.to_string())
    }
}
