use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::AppError;
use crate::models;
use crate::routes::{self, health::HealthResponse};

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Routes reachable without a token.
const PUBLIC_OPERATIONS: &[(&str, &str)] = &[
    ("/api/auth/register", "post"),
    ("/api/auth/login", "post"),
    ("/api/health", "get"),
];

#[derive(OpenApi)]
#[openapi(
    info(title = "TaskHub API", description = "Projects, tasks and users with role-based access"),
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::update_profile,
        routes::auth::change_password,
        routes::auth::logout,
        routes::projects::list_projects,
        routes::projects::create_project,
        routes::projects::get_project,
        routes::projects::update_project,
        routes::projects::delete_project,
        routes::projects::list_project_tasks,
        routes::projects::create_project_task,
        routes::projects::project_stats,
        routes::projects::list_members,
        routes::projects::add_member,
        routes::projects::remove_member,
        routes::tasks::list_tasks,
        routes::tasks::create_task,
        routes::tasks::get_task,
        routes::tasks::update_task,
        routes::tasks::delete_task,
        routes::tasks::update_status,
        routes::tasks::assign_task,
        routes::tasks::update_progress,
        routes::tasks::add_comment,
        routes::tasks::task_history,
        routes::tasks::add_watcher,
        routes::tasks::remove_watcher,
        routes::users::list_simple,
        routes::users::list_users,
        routes::users::get_user,
        routes::users::update_user,
        routes::users::delete_user,
        routes::users::update_role,
        routes::users::update_status,
        routes::users::user_stats
    ),
    components(
        schemas(
            HealthResponse,
            models::Priority,
            models::user::Role,
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::ProfileUpdateRequest,
            models::user::ChangePasswordRequest,
            models::user::UserUpdateRequest,
            models::user::RoleUpdateRequest,
            models::user::StatusUpdateRequest,
            models::user::UserDetail,
            models::user::RecentActivity,
            models::user::UserStats,
            models::user::UserTaskStats,
            models::user::UserProjectStats,
            models::user::MonthlyCompletions,
            models::project::ProjectStatus,
            models::project::Project,
            models::project::ProjectCreateRequest,
            models::project::ProjectUpdateRequest,
            models::project::AddMemberRequest,
            models::project::ProjectMembers,
            models::project::ProjectStats,
            models::project::ProjectSummary,
            models::project::TaskCounts,
            models::project::PriorityCounts,
            models::task::TaskStatus,
            models::task::Task,
            models::task::TaskCreateRequest,
            models::task::TaskUpdateRequest,
            models::task::TaskStatusRequest,
            models::task::AssignTaskRequest,
            models::task::ProgressRequest,
            models::task::WatcherRequest,
            models::comment::Comment,
            models::comment::CommentRequest,
            models::task_log::TaskLog,
            models::task_log::TaskLogAction
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Registration, login and the caller's own account"),
        (name = "Projects", description = "Projects, their members and their tasks"),
        (name = "Tasks", description = "Tasks, comments, watchers and history"),
        (name = "Users", description = "User directory and administration")
    )
)]
pub struct ApiDoc;

/// The generated document plus bearer security, public-route overrides and a server entry.
pub fn build_openapi(port: u16) -> Result<utoipa::openapi::OpenApi, AppError> {
    let mut doc = serde_json::to_value(ApiDoc::openapi()).map_err(openapi_error)?;

    ensure_security_components(&mut doc)?;
    ensure_global_security(&mut doc)?;
    mark_public_operations(&mut doc);
    ensure_servers(&mut doc, port);

    serde_json::from_value(doc).map_err(openapi_error)
}

pub fn swagger_routes(doc: &utoipa::openapi::OpenApi) -> Result<Router, AppError> {
    let swagger_config = utoipa_swagger_ui::Config::new([OPENAPI_JSON_PATH])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(doc).map_err(openapi_error)?);

    let json_route = get(move || {
        let doc_json = Arc::clone(&doc_json);
        async move { Json((*doc_json).clone()) }
    });

    Ok(Router::new()
        .route(OPENAPI_JSON_PATH, json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn openapi_error(err: serde_json::Error) -> AppError {
    AppError::internal(format!("failed to build the OpenAPI document: {err}"))
}

fn object_entry<'a>(object: &'a mut Map<String, Value>, key: &str) -> Result<&'a mut Map<String, Value>, AppError> {
    object
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| AppError::internal(format!("OpenAPI '{key}' must be an object")))
}

fn root(doc: &mut Value) -> Result<&mut Map<String, Value>, AppError> {
    doc.as_object_mut()
        .ok_or_else(|| AppError::internal("OpenAPI root must be an object"))
}

fn ensure_security_components(doc: &mut Value) -> Result<(), AppError> {
    let components = object_entry(root(doc)?, "components")?;
    let schemes = object_entry(components, "securitySchemes")?;
    schemes.insert(
        "bearerAuth".to_string(),
        json!({
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT"
        }),
    );
    Ok(())
}

fn ensure_global_security(doc: &mut Value) -> Result<(), AppError> {
    root(doc)?
        .entry("security")
        .or_insert_with(|| json!([{ "bearerAuth": [] }]));
    Ok(())
}

fn mark_public_operations(doc: &mut Value) {
    for (path, method) in PUBLIC_OPERATIONS {
        if let Some(operation) = doc
            .pointer_mut(&format!("/paths/{}/{method}", path.replace('/', "~1")))
            .and_then(Value::as_object_mut)
        {
            operation.insert("security".to_string(), json!([]));
        }
    }
}

fn ensure_servers(doc: &mut Value, port: u16) {
    let server_url = format!("http://localhost:{port}");

    match doc.get_mut("servers") {
        Some(Value::Array(servers)) => {
            let present = servers
                .iter()
                .any(|server| server.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
            if !present {
                servers.push(json!({ "url": server_url }));
            }
        }
        _ => doc["servers"] = json!([{ "url": server_url }]),
    }
}
