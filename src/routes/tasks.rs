use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{task_scope, Action, Principal, TaskField, TaskScope};
use crate::db::projects::{fetch_project, LoadedProject};
use crate::db::tasks::{
    add_watcher as insert_watcher, append_log, delete_task_cascade, fetch_history, fetch_task, hydrate_task,
    hydrate_tasks, insert_comment, insert_task, remove_watcher as delete_watcher, save_task,
};
use crate::db::users::ensure_user_exists;
use crate::errors::{AppError, AppResult};
use crate::models::comment::{CommentRequest, DbComment, CONTENT_MAX};
use crate::models::task::{
    AssignTaskRequest, DbTask, ProgressRequest, Task, TaskCreateRequest, TaskListQuery, TaskStatus,
    TaskStatusRequest, TaskUpdateRequest, WatcherRequest, DESCRIPTION_MAX, TASK_COLUMNS, TITLE_MAX,
};
use crate::models::task_log::{HistoryQuery, NewTaskLog, TaskLog, TaskLogAction};
use crate::models::{normalize_tags, tags_from_column, tags_to_column, Priority};
use crate::response::{ApiJson, ApiResponse};
use crate::utils::{non_negative_hours, preview, required_text, utc_now};

/// Adds the optional `status`, `priority`, `project` and `assignedTo` filters.
pub(crate) fn push_task_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &TaskListQuery) -> AppResult<()> {
    if let Some(status) = query.status.as_deref().filter(|value| !value.is_empty()) {
        let status: TaskStatus = status.parse()?;
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(priority) = query.priority.as_deref().filter(|value| !value.is_empty()) {
        let priority: Priority = priority.parse()?;
        builder.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(project) = query.project {
        builder.push(" AND project_id = ").push_bind(project);
    }
    if let Some(assignee) = query.assigned_to {
        builder.push(" AND assigned_to = ").push_bind(assignee);
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    tag = "Tasks",
    params(
        ("status" = Option<String>, Query, description = "pending | in-progress | completed"),
        ("priority" = Option<String>, Query, description = "low | medium | high"),
        ("project" = Option<Uuid>, Query, description = "Project id"),
        ("assignedTo" = Option<Uuid>, Query, description = "Assignee id")
    ),
    responses((status = 200, description = "Tasks visible to the caller, newest first", body = [Task]))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<TaskListQuery>,
) -> AppResult<Json<ApiResponse<Vec<Task>>>> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1"));

    match task_scope(&principal) {
        TaskScope::All => {}
        TaskScope::InProjectsOf(user_id) => {
            builder
                .push(" AND project_id IN (SELECT id FROM projects WHERE owner_id = ")
                .push_bind(user_id)
                .push(" UNION SELECT project_id FROM project_members WHERE user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        TaskScope::AssignedOrCreated(user_id) => {
            builder
                .push(" AND (assigned_to = ")
                .push_bind(user_id)
                .push(" OR created_by = ")
                .push_bind(user_id)
                .push(")");
        }
    }

    push_task_filters(&mut builder, &query)?;
    builder.push(" ORDER BY created_at DESC");

    let rows = builder.build_query_as::<DbTask>().fetch_all(&state.pool).await?;
    let tasks = hydrate_tasks(&state.pool, rows).await?;
    Ok(Json(ApiResponse::list(tasks)))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    tag = "Tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Title, description or project missing"),
        (status = 403, description = "Caller may not create tasks in the project"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(payload): ApiJson<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Task>>)> {
    let project_id = match payload.project {
        Some(project_id) if !payload.title.trim().is_empty() && !payload.description.trim().is_empty() => project_id,
        _ => return Err(AppError::bad_request("Title, description, and project are required")),
    };

    let project = fetch_project(&state.pool, project_id).await?;
    let task = create_task_in_project(&state, &principal, &project, payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(task).with_message("Task created successfully")),
    ))
}

/// Creates the task with its creator (and assignee) as watchers and a `created` history entry.
pub(crate) async fn create_task_in_project(
    state: &AppState,
    principal: &Principal,
    project: &LoadedProject,
    payload: TaskCreateRequest,
) -> AppResult<Task> {
    state.policy.authorize(principal, &Action::CreateTask(&project.facts()))?;

    if payload.title.trim().is_empty() || payload.description.trim().is_empty() {
        return Err(AppError::bad_request("Task title and description are required"));
    }
    let title = required_text(&payload.title, "Task title", TITLE_MAX)?;
    let description = required_text(&payload.description, "Description", DESCRIPTION_MAX)?;
    let estimated_hours = payload
        .estimated_hours
        .map(|hours| non_negative_hours(hours, "Estimated hours"))
        .transpose()?;

    if let Some(assignee) = payload.assigned_to {
        ensure_user_exists(&state.pool, assignee).await?;
    }

    let now = utc_now();
    let status = payload.status.unwrap_or_default();
    let row = DbTask {
        id: Uuid::new_v4(),
        project_id: project.id(),
        created_by: principal.id,
        assigned_to: payload.assigned_to,
        title,
        description,
        status: status.as_str().to_string(),
        priority: payload.priority.unwrap_or_default().as_str().to_string(),
        due_date: payload.due_date,
        estimated_hours,
        actual_hours: 0.0,
        completed_at: TaskStatus::Pending.completion_stamp(status, None, now),
        tags: tags_to_column(&normalize_tags(payload.tags.unwrap_or_default())),
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.pool.begin().await?;
    insert_task(&mut tx, &row).await?;
    insert_watcher(&mut tx, row.id, principal.id).await?;
    if let Some(assignee) = row.assigned_to {
        insert_watcher(&mut tx, row.id, assignee).await?;
    }
    append_log(
        &mut tx,
        NewTaskLog::new(row.id, TaskLogAction::Created, principal.id)
            .describe(format!("Task \"{}\" created with status {}", row.title, status)),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(task_id = %row.id, project_id = %row.project_id, by = %principal.id, "task created");

    hydrate_task(&state.pool, row).await
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task detail with comments and watchers", body = Task),
        (status = 403, description = "Not a participant of the task or its project"),
        (status = 404, description = "Task not found")
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let task = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewTask(&task.facts()))?;
    Ok(Json(ApiResponse::ok(hydrate_task(&state.pool, task.row).await?)))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 403, description = "Not allowed, or an assignee sent fields other than status/actualHours")
    )
)]
pub async fn update_task(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<Value>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let fields = match &body {
        Value::Object(map) => TaskField::collect(map.keys()),
        _ => return Err(AppError::bad_request("Request body must be a JSON object")),
    };
    let payload: TaskUpdateRequest = serde_path_to_error::deserialize(body)
        .map_err(|err| AppError::bad_request(format!("Invalid value for '{}': {}", err.path(), err.inner())))?;

    let loaded = fetch_task(&state.pool, id).await?;
    state.policy.authorize(
        &principal,
        &Action::UpdateTask {
            task: &loaded.facts(),
            fields: &fields,
        },
    )?;

    let me = principal.id;
    let now = utc_now();
    let mut row = loaded.row;
    let mut logs: Vec<NewTaskLog> = Vec::new();

    if let Some(title) = payload.title {
        let title = required_text(&title, "Task title", TITLE_MAX)?;
        if title != row.title {
            logs.push(NewTaskLog::new(id, TaskLogAction::Updated, me).change("title", &row.title, &title));
            row.title = title;
        }
    }

    if let Some(description) = payload.description {
        let description = required_text(&description, "Description", DESCRIPTION_MAX)?;
        if description != row.description {
            logs.push(
                NewTaskLog::new(id, TaskLogAction::Updated, me).change("description", &row.description, &description),
            );
            row.description = description;
        }
    }

    if let Some(next) = payload.status {
        let current = row.status()?;
        if next != current {
            row.completed_at = current.completion_stamp(next, row.completed_at, now);
            row.status = next.as_str().to_string();
            logs.push(
                NewTaskLog::new(id, TaskLogAction::StatusChanged, me)
                    .change("status", current, next)
                    .describe(format!("Status changed from {current} to {next}")),
            );
        }
    }

    if let Some(next) = payload.priority {
        let current: Priority = row.priority.parse()?;
        if next != current {
            row.priority = next.as_str().to_string();
            logs.push(
                NewTaskLog::new(id, TaskLogAction::PriorityChanged, me)
                    .change("priority", current, next)
                    .describe(format!("Priority changed from {current} to {next}")),
            );
        }
    }

    let mut new_assignee = None;
    if fields.contains(&TaskField::AssignedTo) && payload.assigned_to != row.assigned_to {
        if let Some(assignee) = payload.assigned_to {
            ensure_user_exists(&state.pool, assignee).await?;
        }
        logs.push(assignment_log(id, me, row.assigned_to, payload.assigned_to));
        row.assigned_to = payload.assigned_to;
        new_assignee = payload.assigned_to;
    }

    if fields.contains(&TaskField::DueDate) && payload.due_date != row.due_date {
        logs.push(
            NewTaskLog::new(id, TaskLogAction::DueDateChanged, me)
                .change("dueDate", row.due_date, payload.due_date)
                .describe("Due date changed"),
        );
        row.due_date = payload.due_date;
    }

    if fields.contains(&TaskField::EstimatedHours) {
        let next = payload
            .estimated_hours
            .map(|hours| non_negative_hours(hours, "Estimated hours"))
            .transpose()?;
        if next != row.estimated_hours {
            logs.push(
                NewTaskLog::new(id, TaskLogAction::Updated, me).change("estimatedHours", row.estimated_hours, next),
            );
            row.estimated_hours = next;
        }
    }

    if let Some(hours) = payload.actual_hours {
        let hours = non_negative_hours(hours, "Actual hours")?;
        if hours != row.actual_hours {
            logs.push(
                NewTaskLog::new(id, TaskLogAction::Updated, me)
                    .change("actualHours", row.actual_hours, hours)
                    .describe(format!("Actual hours updated from {} to {}", row.actual_hours, hours)),
            );
            row.actual_hours = hours;
        }
    }

    if let Some(tags) = payload.tags {
        let current = tags_from_column(&row.tags)?;
        let next = normalize_tags(tags);
        if next != current {
            logs.push(NewTaskLog::new(id, TaskLogAction::Updated, me).change("tags", &current, &next));
            row.tags = tags_to_column(&next);
        }
    }

    if !logs.is_empty() {
        row.updated_at = now;

        let mut tx = state.pool.begin().await?;
        save_task(&mut tx, &row).await?;
        if let Some(assignee) = new_assignee {
            insert_watcher(&mut tx, id, assignee).await?;
        }
        for entry in logs {
            append_log(&mut tx, entry).await?;
        }
        tx.commit().await?;
    }

    let task = hydrate_task(&state.pool, row).await?;
    Ok(Json(ApiResponse::ok(task).with_message("Task updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task and its history deleted"),
        (status = 403, description = "Only the creator, project owner, a Manager or Admin may delete")
    )
)]
pub async fn delete_task(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let task = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::DeleteTask(&task.facts()))?;

    let mut tx = state.pool.begin().await?;
    delete_task_cascade(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(task_id = %id, by = %principal.id, "task deleted");

    Ok(Json(ApiResponse::ok(json!({ "id": id })).with_message("Task deleted successfully")))
}

#[utoipa::path(
    patch,
    path = "/api/tasks/{id}/status",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = TaskStatusRequest,
    responses(
        (status = 200, description = "Status changed; completedAt follows the status", body = Task),
        (status = 400, description = "Unknown status")
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<TaskStatusRequest>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let next: TaskStatus = payload.status.parse()?;

    let loaded = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewTask(&loaded.facts()))?;

    let now = utc_now();
    let mut row = loaded.row;
    let current = row.status()?;
    row.completed_at = current.completion_stamp(next, row.completed_at, now);
    row.status = next.as_str().to_string();
    row.updated_at = now;

    let mut tx = state.pool.begin().await?;
    save_task(&mut tx, &row).await?;
    append_log(
        &mut tx,
        NewTaskLog::new(id, TaskLogAction::StatusChanged, principal.id)
            .change("status", current, next)
            .describe(format!("Status changed from {current} to {next}")),
    )
    .await?;
    tx.commit().await?;

    let task = hydrate_task(&state.pool, row).await?;
    Ok(Json(ApiResponse::ok(task).with_message("Task status updated successfully")))
}

#[utoipa::path(
    patch,
    path = "/api/tasks/{id}/assign",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = AssignTaskRequest,
    responses(
        (status = 200, description = "Task assigned or unassigned", body = Task),
        (status = 403, description = "Only the project owner, creator, a Manager or Admin may assign"),
        (status = 404, description = "Task or user not found")
    )
)]
pub async fn assign_task(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<AssignTaskRequest>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let loaded = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::AssignTask(&loaded.facts()))?;

    if let Some(assignee) = payload.user_id {
        ensure_user_exists(&state.pool, assignee).await?;
    }

    let mut row = loaded.row;
    let previous = row.assigned_to;
    row.assigned_to = payload.user_id;
    row.updated_at = utc_now();

    let mut tx = state.pool.begin().await?;
    save_task(&mut tx, &row).await?;
    if let Some(assignee) = row.assigned_to {
        insert_watcher(&mut tx, id, assignee).await?;
    }
    append_log(&mut tx, assignment_log(id, principal.id, previous, row.assigned_to)).await?;
    tx.commit().await?;

    let message = if row.assigned_to.is_some() {
        "Task assigned successfully"
    } else {
        "Task unassigned successfully"
    };
    let task = hydrate_task(&state.pool, row).await?;
    Ok(Json(ApiResponse::ok(task).with_message(message)))
}

fn assignment_log(task_id: Uuid, by: Uuid, previous: Option<Uuid>, next: Option<Uuid>) -> NewTaskLog {
    match next {
        Some(assignee) => NewTaskLog::new(task_id, TaskLogAction::Assigned, by)
            .change("assignedTo", previous, next)
            .describe(format!("Task assigned to {assignee}")),
        None => NewTaskLog::new(task_id, TaskLogAction::Unassigned, by)
            .change("assignedTo", previous, next)
            .describe("Task unassigned"),
    }
}

#[utoipa::path(
    patch,
    path = "/api/tasks/{id}/progress",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = ProgressRequest,
    responses(
        (status = 200, description = "Actual hours updated", body = Task),
        (status = 400, description = "Missing or negative hours")
    )
)]
pub async fn update_progress(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<ProgressRequest>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let loaded = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewTask(&loaded.facts()))?;

    let hours = payload
        .actual_hours
        .ok_or_else(|| AppError::bad_request("Actual hours is required"))?;
    let hours = non_negative_hours(hours, "Actual hours")?;

    let mut row = loaded.row;
    let previous = row.actual_hours;
    row.actual_hours = hours;
    row.updated_at = utc_now();

    let mut tx = state.pool.begin().await?;
    save_task(&mut tx, &row).await?;
    append_log(
        &mut tx,
        NewTaskLog::new(id, TaskLogAction::Updated, principal.id)
            .change("actualHours", previous, hours)
            .describe(format!("Actual hours updated from {previous} to {hours}")),
    )
    .await?;
    tx.commit().await?;

    let task = hydrate_task(&state.pool, row).await?;
    Ok(Json(ApiResponse::ok(task).with_message("Task progress updated successfully")))
}

#[utoipa::path(
    post,
    path = "/api/tasks/{id}/comments",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment added", body = Task),
        (status = 400, description = "Empty or too long comment")
    )
)]
pub async fn add_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<CommentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Task>>)> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(AppError::bad_request("Comment content is required"));
    }
    let content = required_text(content, "Comment", CONTENT_MAX)?;

    let loaded = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewTask(&loaded.facts()))?;

    let now = utc_now();
    let comment = DbComment {
        id: Uuid::new_v4(),
        task_id: id,
        author_id: principal.id,
        content,
        created_at: now,
    };

    let mut row = loaded.row;
    row.updated_at = now;

    let mut tx = state.pool.begin().await?;
    insert_comment(&mut tx, &comment).await?;
    save_task(&mut tx, &row).await?;
    append_log(
        &mut tx,
        NewTaskLog::new(id, TaskLogAction::CommentAdded, principal.id)
            .describe(format!("Comment added: {}", preview(&comment.content, 50))),
    )
    .await?;
    tx.commit().await?;

    let task = hydrate_task(&state.pool, row).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(task).with_message("Comment added successfully")),
    ))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}/history",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Task id"),
        ("limit" = Option<i64>, Query, description = "Entries to return, default 50")
    ),
    responses((status = 200, description = "History, newest first", body = [TaskLog]))
)]
pub async fn task_history(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<Vec<TaskLog>>>> {
    let loaded = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewTask(&loaded.facts()))?;

    let history = fetch_history(&state.pool, id, query.effective_limit()).await?;
    Ok(Json(ApiResponse::list(history)))
}

#[utoipa::path(
    post,
    path = "/api/tasks/{id}/watchers",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = WatcherRequest,
    responses((status = 200, description = "Watcher added", body = Task))
)]
pub async fn add_watcher(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<WatcherRequest>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::bad_request("User ID is required"))?;

    let loaded = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewTask(&loaded.facts()))?;
    ensure_user_exists(&state.pool, user_id).await?;

    let mut conn = state.pool.acquire().await?;
    insert_watcher(&mut conn, id, user_id).await?;
    drop(conn);

    let task = hydrate_task(&state.pool, loaded.row).await?;
    Ok(Json(ApiResponse::ok(task).with_message("Watcher added successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}/watchers/{user_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Task id"),
        ("user_id" = Uuid, Path, description = "Watcher to remove")
    ),
    responses(
        (status = 200, description = "Watcher removed", body = Task),
        (status = 400, description = "The creator and the assignee cannot stop watching")
    )
)]
pub async fn remove_watcher(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let loaded = fetch_task(&state.pool, id).await?;
    state.policy.authorize(&principal, &Action::ViewTask(&loaded.facts()))?;

    if loaded.row.created_by == user_id || loaded.row.assigned_to == Some(user_id) {
        return Err(AppError::rejected(
            "The task creator and assignee always watch the task",
            None,
        ));
    }

    let mut conn = state.pool.acquire().await?;
    delete_watcher(&mut conn, id, user_id).await?;
    drop(conn);

    let task = hydrate_task(&state.pool, loaded.row).await?;
    Ok(Json(ApiResponse::ok(task).with_message("Watcher removed successfully")))
}
