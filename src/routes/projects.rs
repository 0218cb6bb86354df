use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{project_scope, Action, Principal, ProjectScope};
use crate::db::projects::{add_member as insert_member, delete_project_cascade, fetch_project, hydrate_projects, touch};
use crate::db::tasks::hydrate_tasks;
use crate::db::users::{ensure_user_exists, fetch_users};
use crate::errors::{AppError, AppResult};
use crate::models::project::{
    AddMemberRequest, DbProject, Project, ProjectCreateRequest, ProjectMembers, ProjectStats, ProjectUpdateRequest,
    DESCRIPTION_MAX, PROJECT_COLUMNS, TITLE_MAX,
};
use crate::models::task::{DbTask, Task, TaskCreateRequest, TaskListQuery, TASK_COLUMNS};
use crate::models::{normalize_tags, tags_to_column};
use crate::response::{ApiJson, ApiResponse};
use crate::routes::tasks::{create_task_in_project, push_task_filters};
use crate::utils::{bounded_text, required_text, utc_now};

#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "Projects",
    responses((status = 200, description = "Projects visible to the caller, newest first", body = [Project]))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<ApiResponse<Vec<Project>>>> {
    let rows = match project_scope(&principal) {
        ProjectScope::All => {
            sqlx::query_as::<_, DbProject>(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at DESC"
            ))
            .fetch_all(&state.pool)
            .await?
        }
        ProjectScope::OwnedOrMember(user_id) => {
            sqlx::query_as::<_, DbProject>(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects \
                 WHERE owner_id = ? OR id IN (SELECT project_id FROM project_members WHERE user_id = ?) \
                 ORDER BY created_at DESC"
            ))
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&state.pool)
            .await?
        }
        ProjectScope::MemberOf(user_id) => {
            sqlx::query_as::<_, DbProject>(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects \
                 WHERE id IN (SELECT project_id FROM project_members WHERE user_id = ?) \
                 ORDER BY created_at DESC"
            ))
            .bind(user_id)
            .fetch_all(&state.pool)
            .await?
        }
    };

    let projects = hydrate_projects(&state.pool, rows).await?;
    Ok(Json(ApiResponse::list(projects)))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created; the caller becomes owner and member", body = Project),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn create_project(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(payload): ApiJson<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Project>>)> {
    state.policy.authorize(&principal, &Action::CreateProject)?;

    if payload.title.trim().is_empty() || payload.description.trim().is_empty() {
        return Err(AppError::bad_request("Project title and description are required"));
    }
    let title = required_text(&payload.title, "Project title", TITLE_MAX)?;
    let description = required_text(&payload.description, "Description", DESCRIPTION_MAX)?;

    let mut members = vec![principal.id];
    for member in payload.members.unwrap_or_default() {
        if !members.contains(&member) {
            members.push(member);
        }
    }

    let now = utc_now();
    let project_id = Uuid::new_v4();
    let tags = normalize_tags(payload.tags.unwrap_or_default());

    let mut tx = state.pool.begin().await?;

    for member in members.iter().skip(1) {
        ensure_user_exists(&mut *tx, *member).await?;
    }

    sqlx::query(&format!(
        "INSERT INTO projects ({PROJECT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(project_id)
    .bind(principal.id)
    .bind(&title)
    .bind(&description)
    .bind("active")
    .bind(payload.priority.unwrap_or_default().as_str())
    .bind(tags_to_column(&tags))
    .bind(now)
    .bind(payload.end_date)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for member in &members {
        insert_member(&mut tx, project_id, *member).await?;
    }

    tx.commit().await?;

    tracing::info!(project_id = %project_id, owner = %principal.id, members = members.len(), "project created");

    let project = fetch_project(&state.pool, project_id).await?.into_project()?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(project).with_message("Project created successfully")),
    ))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 403, description = "Not owner, member or Admin"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn get_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Project>>> {
    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewProject(&project.facts()))?;
    Ok(Json(ApiResponse::ok(project.into_project()?)))
}

#[utoipa::path(
    put,
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 403, description = "Only the owner or an Admin may update")
    )
)]
pub async fn update_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<ProjectUpdateRequest>,
) -> AppResult<Json<ApiResponse<Project>>> {
    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::UpdateProject(&project.facts()))?;

    let mut row = project.row;

    // blank title/description are ignored rather than rejected
    if let Some(title) = payload.title.as_deref().filter(|t| !t.trim().is_empty()) {
        row.title = required_text(title, "Project title", TITLE_MAX)?;
    }
    if let Some(description) = payload.description.as_deref().filter(|d| !d.trim().is_empty()) {
        row.description = bounded_text(description, "Description", DESCRIPTION_MAX)?;
    }
    if let Some(status) = payload.status {
        row.status = status.as_str().to_string();
    }
    if let Some(priority) = payload.priority {
        row.priority = priority.as_str().to_string();
    }
    if let Some(end_date) = payload.end_date {
        row.end_date = Some(end_date);
    }
    if let Some(tags) = payload.tags {
        row.tags = tags_to_column(&normalize_tags(tags));
    }

    sqlx::query(
        "UPDATE projects SET title = ?, description = ?, status = ?, priority = ?, end_date = ?, tags = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&row.title)
    .bind(&row.description)
    .bind(&row.status)
    .bind(&row.priority)
    .bind(row.end_date)
    .bind(&row.tags)
    .bind(utc_now())
    .bind(id)
    .execute(&state.pool)
    .await?;

    let project = fetch_project(&state.pool, id).await?.into_project()?;
    Ok(Json(ApiResponse::ok(project).with_message("Project updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project and all of its tasks deleted"),
        (status = 403, description = "Only the owner or an Admin may delete")
    )
)]
pub async fn delete_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::DeleteProject(&project.facts()))?;

    let mut tx = state.pool.begin().await?;
    let deleted_tasks = delete_project_cascade(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(project_id = %id, deleted_tasks, by = %principal.id, "project deleted");

    Ok(Json(
        ApiResponse::ok(json!({ "id": id, "deletedTasks": deleted_tasks }))
            .with_message("Project and related tasks deleted successfully"),
    ))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/tasks",
    tag = "Projects",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("status" = Option<String>, Query, description = "pending | in-progress | completed"),
        ("priority" = Option<String>, Query, description = "low | medium | high"),
        ("assignedTo" = Option<Uuid>, Query, description = "Assignee id")
    ),
    responses((status = 200, description = "Tasks of the project", body = [Task]))
)]
pub async fn list_project_tasks(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<Json<ApiResponse<Vec<Task>>>> {
    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewProject(&project.facts()))?;

    let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = "
    ));
    builder.push_bind(id);
    push_task_filters(&mut builder, &TaskListQuery { project: None, ..query })?;
    builder.push(" ORDER BY created_at DESC");

    let rows = builder.build_query_as::<DbTask>().fetch_all(&state.pool).await?;
    let tasks = hydrate_tasks(&state.pool, rows).await?;
    Ok(Json(ApiResponse::list(tasks)))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/tasks",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created in the project", body = Task),
        (status = 403, description = "Caller may not create tasks here")
    )
)]
pub async fn create_project_task(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Task>>)> {
    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewProject(&project.facts()))?;

    let task = create_task_in_project(&state, &principal, &project, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(task).with_message("Task created successfully")),
    ))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/stats",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Task counts and completion", body = ProjectStats))
)]
pub async fn project_stats(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProjectStats>>> {
    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewProject(&project.facts()))?;

    let tasks = sqlx::query_as::<_, DbTask>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?"))
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    let project = project.into_project()?;
    Ok(Json(ApiResponse::ok(ProjectStats::compute(&project, &tasks, utc_now()))))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/members",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Owner and members", body = ProjectMembers))
)]
pub async fn list_members(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProjectMembers>>> {
    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewProject(&project.facts()))?;

    let owner_id = project.row.owner_id;
    let mut users = fetch_users(&state.pool, &[owner_id]).await?;
    let owner = users
        .pop()
        .ok_or_else(|| AppError::internal("project owner account is missing"))?;
    let members = fetch_users(&state.pool, &project.members).await?;

    let total_members = members.len() + usize::from(!project.members.contains(&owner_id));

    Ok(Json(ApiResponse::ok(ProjectMembers {
        owner,
        members,
        total_members,
    })))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/members",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = AddMemberRequest,
    responses(
        (status = 200, description = "Member added", body = Project),
        (status = 400, description = "Missing user id or already a member"),
        (status = 404, description = "Project or user not found")
    )
)]
pub async fn add_member(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<AddMemberRequest>,
) -> AppResult<Json<ApiResponse<Project>>> {
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::bad_request("User ID is required"))?;

    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::AddProjectMember(&project.facts()))?;

    ensure_user_exists(&state.pool, user_id).await?;
    if project.members.contains(&user_id) {
        return Err(AppError::bad_request("User is already a member of this project"));
    }

    let mut tx = state.pool.begin().await?;
    insert_member(&mut tx, id, user_id).await?;
    touch(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(project_id = %id, user_id = %user_id, by = %principal.id, "project member added");

    let project = fetch_project(&state.pool, id).await?.into_project()?;
    Ok(Json(ApiResponse::ok(project).with_message("Member added successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}/members/{user_id}",
    tag = "Projects",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Member to remove")
    ),
    responses(
        (status = 200, description = "Member removed", body = Project),
        (status = 400, description = "Not a member, or the owner")
    )
)]
pub async fn remove_member(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Project>>> {
    let project = fetch_project(&state.pool, id).await?;
    state.policy.authorize(
        &principal,
        &Action::RemoveProjectMember {
            project: &project.facts(),
            member: user_id,
        },
    )?;

    if !project.members.contains(&user_id) {
        return Err(AppError::bad_request("User is not a member of this project"));
    }

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    touch(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(project_id = %id, user_id = %user_id, by = %principal.id, "project member removed");

    let project = fetch_project(&state.pool, id).await?.into_project()?;
    Ok(Json(ApiResponse::ok(project).with_message("Member removed successfully")))
}
