use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{DefaultPolicyEvaluator, PolicyEvaluator};
use crate::config::AppConfig;
use crate::docs;
use crate::errors::{attach_error_detail, AppError};
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, projects, tasks, users};

/// Everything a handler may need, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub policy: Arc<dyn PolicyEvaluator>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            pool,
            jwt: Arc::new(config.jwt.clone()),
            policy: Arc::new(DefaultPolicyEvaluator::new()),
            config: Arc::new(config),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEvaluator>) -> Self {
        self.policy = policy;
        self
    }
}

pub fn create_app_with_config(pool: SqlitePool, config: AppConfig) -> Result<Router, AppError> {
    build_router(AppState::new(pool, config))
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let cors = cors_layer(&state.config)?;
    let openapi = docs::build_openapi(state.config.port)?;

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/profile", put(auth::update_profile))
        .route("/change-password", put(auth::change_password))
        .route("/logout", post(auth::logout));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route(
            "/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/:id/tasks",
            get(projects::list_project_tasks).post(projects::create_project_task),
        )
        .route("/:id/stats", get(projects::project_stats))
        .route(
            "/:id/members",
            get(projects::list_members).post(projects::add_member),
        )
        .route("/:id/members/:user_id", delete(projects::remove_member));

    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/:id",
            get(tasks::get_task).put(tasks::update_task).delete(tasks::delete_task),
        )
        .route("/:id/status", patch(tasks::update_status))
        .route("/:id/assign", patch(tasks::assign_task))
        .route("/:id/progress", patch(tasks::update_progress))
        .route("/:id/comments", post(tasks::add_comment))
        .route("/:id/history", get(tasks::task_history))
        .route("/:id/watchers", post(tasks::add_watcher))
        .route("/:id/watchers/:user_id", delete(tasks::remove_watcher));

    let user_routes = Router::new()
        .route("/simple", get(users::list_simple))
        .route("/", get(users::list_users))
        .route(
            "/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/:id/role", patch(users::update_role))
        .route("/:id/status", patch(users::update_status))
        .route("/:id/stats", get(users::user_stats));

    let api = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/projects", project_routes)
        .nest("/tasks", task_routes)
        .nest("/users", user_routes);

    let router = Router::new()
        .nest("/api", api)
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(state.clone(), attach_error_detail))
        .with_state(state)
        .merge(docs::swagger_routes(&openapi)?)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

async fn route_not_found() -> AppError {
    AppError::not_found("Route not found")
}

fn cors_layer(config: &AppConfig) -> Result<CorsLayer, AppError> {
    let origins = config
        .cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| AppError::configuration(format!("invalid CORS origin '{origin}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(AllowOrigin::list(origins))
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true))
}
