use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::app::AppState;
use crate::authz::DenyReason;
use crate::jwt::IdentityError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {message}")]
    Forbidden { message: String, details: Option<Value> },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    /// A request that was understood and permitted to reach the rule check,
    /// but refused by a business rule (owner removal, self role change...).
    #[error("rejected: {message}")]
    Rejected { message: String, details: Option<Value> },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn rejected(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::Rejected {
            message: message.into(),
            details,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            // duplicates are reported as a plain validation failure
            AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected { .. } => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden { .. } => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::BadRequest(_) => "bad_request",
            AppError::Rejected { .. } => "rejected",
            AppError::Configuration(_) => "configuration",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }

    /// Caller-facing message. Server-side failures never leak their cause here.
    fn public_message(&self) -> String {
        match self {
            AppError::Unauthorized(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message)
            | AppError::BadRequest(message) => message.clone(),
            AppError::Forbidden { message, .. } | AppError::Rejected { message, .. } => message.clone(),
            AppError::Configuration(_) | AppError::Database(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let payload = ErrorResponse {
            success: false,
            message: self.public_message(),
            error: self.code(),
            details: match &self {
                AppError::Forbidden { details, .. } | AppError::Rejected { details, .. } => details.clone(),
                _ => None,
            },
            detail: None,
        };

        let mut response = (status, Json(payload.clone())).into_response();
        response.extensions_mut().insert(ErrorDetail {
            payload,
            debug: format!("{self:?}"),
        });
        response
    }
}

/// Rendered error kept on the response so the envelope can be re-rendered with `detail`.
#[derive(Debug, Clone)]
struct ErrorDetail {
    payload: ErrorResponse,
    debug: String,
}

/// Adds the debug rendering of a failure to its envelope when the app runs in development.
pub async fn attach_error_detail(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    if !state.config.environment.is_development() {
        return response;
    }

    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(ErrorDetail { mut payload, debug }) => {
            payload.detail = Some(debug);
            (response.status(), Json(payload)).into_response()
        }
        None => response,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(unique_violation_message(db.message()))
            }
            _ => Self::Database(err),
        }
    }
}

/// SQLite reports `UNIQUE constraint failed: users.email`; name the column when there is one.
fn unique_violation_message(raw: &str) -> String {
    match raw.rsplit_once('.') {
        Some((_, column)) if !column.trim().is_empty() => format!("{} already exists", column.trim()),
        _ => "record already exists".to_string(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<IdentityError> for AppError {
    fn from(value: IdentityError) -> Self {
        Self::Unauthorized(value.to_string())
    }
}

impl From<DenyReason> for AppError {
    fn from(reason: DenyReason) -> Self {
        let message = reason.to_string();
        let details = reason.details();
        if reason.is_forbidden() {
            Self::Forbidden { message, details }
        } else {
            Self::Rejected { message, details }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_reported_as_bad_request() {
        assert_eq!(AppError::conflict("taken").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn server_errors_hide_their_cause() {
        let err = AppError::internal("disk on fire");
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn deny_reasons_map_to_forbidden_or_rejected() {
        let forbidden: AppError = DenyReason::NotProjectParticipant.into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let rejected: AppError = DenyReason::UserHasActiveWork {
            owned_projects: 2,
            open_assigned_tasks: 1,
        }
        .into();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        match rejected {
            AppError::Rejected { details: Some(details), .. } => {
                assert_eq!(details["ownedProjects"], 2);
                assert_eq!(details["assignedTasks"], 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn forbidden_denials_keep_their_details() {
        let err: AppError = DenyReason::AssigneeFieldRestriction {
            rejected: vec!["title".to_string()],
        }
        .into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        match err {
            AppError::Forbidden { details: Some(details), .. } => {
                assert_eq!(details["fields"], serde_json::json!(["title"]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unique_violation_names_the_column() {
        assert_eq!(
            unique_violation_message("UNIQUE constraint failed: users.email"),
            "email already exists"
        );
        assert_eq!(unique_violation_message("constraint failed"), "record already exists");
    }

    #[tokio::test]
    async fn unique_violations_become_conflicts() {
        use sqlx::Connection;

        let mut conn = sqlx::SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE users (username TEXT NOT NULL UNIQUE)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (username) VALUES ('ada')")
            .execute(&mut conn)
            .await
            .unwrap();

        let err: AppError = sqlx::query("INSERT INTO users (username) VALUES ('ada')")
            .execute(&mut conn)
            .await
            .unwrap_err()
            .into();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "conflict");
        assert_eq!(err.public_message(), "username already exists");

        let missing: AppError = sqlx::query("SELECT * FROM nowhere").execute(&mut conn).await.unwrap_err().into();
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
