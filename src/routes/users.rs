use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{directory_roles, Action, Principal};
use crate::db::projects::{accessible_project_ids, hydrate_projects};
use crate::db::tasks::hydrate_tasks;
use crate::db::users::{fetch_user, member_project_count, open_assigned_task_count, owned_project_count};
use crate::errors::{AppError, AppResult};
use crate::models::project::{DbProject, PROJECT_COLUMNS};
use crate::models::task::{DbTask, TASK_COLUMNS};
use crate::models::user::{
    monthly_completions, DbUser, ProfileUpdateRequest, RecentActivity, Role, RoleUpdateRequest, StatusUpdateRequest,
    User, UserDetail, UserListQuery, UserProjectStats, UserStats, UserTaskStats, UserUpdateRequest, USER_COLUMNS,
};
use crate::response::{ApiJson, ApiResponse};
use crate::routes::auth::apply_profile_changes;
use crate::utils::utc_now;

const RECENT_TASKS: i64 = 5;
const RECENT_PROJECTS: i64 = 3;
const STATS_MONTHS: u32 = 6;

#[utoipa::path(
    get,
    path = "/api/users/simple",
    tag = "Users",
    responses((status = 200, description = "Active users for pickers, sorted by name", body = [User]))
)]
pub async fn list_simple(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE is_active = 1"));

    if let Some(roles) = directory_roles(&principal) {
        builder.push(" AND role IN (");
        let mut separated = builder.separated(", ");
        for role in roles {
            separated.push_bind(role.as_str());
        }
        separated.push_unseparated(")");
    }
    builder.push(" ORDER BY name ASC");

    let rows = builder.build_query_as::<DbUser>().fetch_all(&state.pool).await?;
    let users = rows.into_iter().map(User::try_from).collect::<AppResult<Vec<_>>>()?;
    Ok(Json(ApiResponse::list(users)))
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    params(
        ("role" = Option<String>, Query, description = "Admin | Manager | Developer"),
        ("isActive" = Option<bool>, Query, description = "Filter on account state"),
        ("search" = Option<String>, Query, description = "Case-insensitive match on username, name or email")
    ),
    responses(
        (status = 200, description = "Users, newest first", body = [User]),
        (status = 403, description = "Manager or Admin role required")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    state.policy.authorize(&principal, &Action::ListUsers)?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1 = 1"));

    if let Some(role) = query.role.as_deref().filter(|value| !value.is_empty()) {
        let role: Role = role.parse()?;
        builder.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(is_active) = query.is_active {
        builder.push(" AND is_active = ").push_bind(is_active);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        let needle = search.to_lowercase();
        builder
            .push(" AND (instr(lower(username), ")
            .push_bind(needle.clone())
            .push(") > 0 OR instr(lower(name), ")
            .push_bind(needle.clone())
            .push(") > 0 OR instr(lower(email), ")
            .push_bind(needle)
            .push(") > 0)");
    }
    builder.push(" ORDER BY created_at DESC");

    let rows = builder.build_query_as::<DbUser>().fetch_all(&state.pool).await?;
    let users = rows.into_iter().map(User::try_from).collect::<AppResult<Vec<_>>>()?;
    Ok(Json(ApiResponse::list(users)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User; recentActivity is included for the caller's own account", body = UserDetail),
        (status = 403, description = "Developers may only view themselves"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UserDetail>>> {
    state.policy.authorize(&principal, &Action::ViewUser { target: id })?;

    let user: User = fetch_user(&state.pool, id).await?.try_into()?;
    let recent_activity = if principal.is(id) {
        Some(recent_activity(&state, id).await?)
    } else {
        None
    };

    Ok(Json(ApiResponse::ok(UserDetail { user, recent_activity })))
}

async fn recent_activity(state: &AppState, user_id: Uuid) -> AppResult<RecentActivity> {
    let task_rows = sqlx::query_as::<_, DbTask>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE assigned_to = ? OR created_by = ? ORDER BY updated_at DESC LIMIT ?"
    ))
    .bind(user_id)
    .bind(user_id)
    .bind(RECENT_TASKS)
    .fetch_all(&state.pool)
    .await?;

    let project_rows = sqlx::query_as::<_, DbProject>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = ? ORDER BY updated_at DESC LIMIT ?"
    ))
    .bind(user_id)
    .bind(RECENT_PROJECTS)
    .fetch_all(&state.pool)
    .await?;

    Ok(RecentActivity {
        tasks: hydrate_tasks(&state.pool, task_rows).await?,
        projects: hydrate_projects(&state.pool, project_rows).await?,
    })
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Validation failed, username/email taken, or own role change"),
        (status = 403, description = "Only the user themselves or an Admin may update")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UserUpdateRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    state.policy.authorize(&principal, &Action::UpdateUser { target: id })?;

    // role is silently ignored unless an Admin sends it
    let role = match payload.role {
        Some(role) if principal.is_admin() => {
            state.policy.authorize(&principal, &Action::ChangeUserRole { target: id })?;
            Some(role)
        }
        _ => None,
    };

    let profile = ProfileUpdateRequest {
        username: payload.username,
        name: payload.name,
        email: payload.email,
        avatar: payload.avatar,
    };
    let mut user = apply_profile_changes(&state, id, profile).await?;

    if let Some(role) = role {
        user = set_role(&state, id, role).await?;
        tracing::info!(user_id = %id, role = %role, by = %principal.id, "user role changed");
    }

    Ok(Json(ApiResponse::ok(user).with_message("User updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "Own account, or the user still owns projects or has open tasks"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let owned_projects = owned_project_count(&state.pool, id).await?;
    let open_assigned_tasks = open_assigned_task_count(&state.pool, id).await?;

    state.policy.authorize(
        &principal,
        &Action::DeleteUser {
            target: id,
            owned_projects,
            open_assigned_tasks,
        },
    )?;

    fetch_user(&state.pool, id).await?;

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM project_members WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    // creators and assignees always stay on their tasks' watcher lists
    sqlx::query(
        "DELETE FROM task_watchers WHERE user_id = ?1 AND task_id NOT IN \
         (SELECT id FROM tasks WHERE created_by = ?1 OR assigned_to = ?1)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %id, by = %principal.id, "user deleted");

    Ok(Json(ApiResponse::ok(json!({ "id": id })).with_message("User deleted successfully")))
}

#[utoipa::path(
    patch,
    path = "/api/users/{id}/role",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role changed", body = User),
        (status = 400, description = "Invalid role or own role"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<RoleUpdateRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    state.policy.authorize(&principal, &Action::ChangeUserRole { target: id })?;

    let role: Role = payload.role.parse()?;
    fetch_user(&state.pool, id).await?;
    let user = set_role(&state, id, role).await?;

    tracing::info!(user_id = %id, role = %role, by = %principal.id, "user role changed");

    Ok(Json(ApiResponse::ok(user).with_message("User role updated successfully")))
}

async fn set_role(state: &AppState, id: Uuid, role: Role) -> AppResult<User> {
    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await?;
    fetch_user(&state.pool, id).await?.try_into()
}

#[utoipa::path(
    patch,
    path = "/api/users/{id}/status",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Account activated or deactivated", body = User),
        (status = 400, description = "isActive missing"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<StatusUpdateRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    state.policy.authorize(&principal, &Action::ChangeUserStatus { target: id })?;

    let is_active = payload
        .is_active
        .ok_or_else(|| AppError::bad_request("isActive field must be boolean"))?;
    fetch_user(&state.pool, id).await?;

    sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(is_active)
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %id, is_active, by = %principal.id, "user status changed");

    let user: User = fetch_user(&state.pool, id).await?.try_into()?;
    let message = if is_active {
        "User activated successfully"
    } else {
        "User deactivated successfully"
    };
    Ok(Json(ApiResponse::ok(user).with_message(message)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}/stats",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Task and project statistics", body = UserStats),
        (status = 403, description = "Developers may only view their own stats")
    )
)]
pub async fn user_stats(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UserStats>>> {
    state.policy.authorize(&principal, &Action::ViewUser { target: id })?;
    fetch_user(&state.pool, id).await?;

    let assigned = sqlx::query_as::<_, DbTask>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE assigned_to = ?"))
        .bind(id)
        .fetch_all(&state.pool)
        .await?;
    let created: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM tasks WHERE created_by = ?")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    let projects = UserProjectStats {
        owned: owned_project_count(&state.pool, id).await?,
        member: member_project_count(&state.pool, id).await?,
        total: accessible_project_ids(&state.pool, id).await?.len() as i64,
    };

    let now = utc_now();
    Ok(Json(ApiResponse::ok(UserStats {
        user_id: id,
        tasks: UserTaskStats::compute(&assigned, created as usize, now),
        projects,
        monthly_completions: monthly_completions(&assigned, now, STATS_MONTHS),
    })))
}
