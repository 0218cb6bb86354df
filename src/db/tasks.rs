use std::collections::HashMap;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::projects::{fetch_project, LoadedProject};
use crate::authz::TaskFacts;
use crate::errors::{AppError, AppResult};
use crate::models::comment::{Comment, DbComment};
use crate::models::task::{DbTask, Task, TASK_COLUMNS};
use crate::models::task_log::{DbTaskLog, NewTaskLog, TaskLog};
use crate::utils::utc_now;

/// A task row with the project it belongs to.
#[derive(Debug, Clone)]
pub struct LoadedTask {
    pub row: DbTask,
    pub project: LoadedProject,
}

impl LoadedTask {
    pub fn facts(&self) -> TaskFacts {
        self.row.facts(self.project.facts())
    }
}

pub async fn fetch_task_row(pool: &SqlitePool, id: Uuid) -> AppResult<DbTask> {
    sqlx::query_as::<_, DbTask>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))
}

pub async fn fetch_task(pool: &SqlitePool, id: Uuid) -> AppResult<LoadedTask> {
    let row = fetch_task_row(pool, id).await?;
    let project = fetch_project(pool, row.project_id).await?;
    Ok(LoadedTask { row, project })
}

/// Loads watchers and comments for the rows and builds the API view, keeping row order.
pub async fn hydrate_tasks(pool: &SqlitePool, rows: Vec<DbTask>) -> AppResult<Vec<Task>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let in_list = super::placeholders(ids.len());

    let watcher_sql = format!(
        "SELECT task_id, user_id FROM task_watchers WHERE task_id IN ({in_list}) ORDER BY added_at ASC, rowid ASC"
    );
    let mut watcher_query = sqlx::query_as::<_, (Uuid, Uuid)>(&watcher_sql);
    for id in &ids {
        watcher_query = watcher_query.bind(*id);
    }
    let mut watchers: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (task_id, user_id) in watcher_query.fetch_all(pool).await? {
        watchers.entry(task_id).or_default().push(user_id);
    }

    let comment_sql = format!(
        "SELECT id, task_id, author_id, content, created_at FROM task_comments \
         WHERE task_id IN ({in_list}) ORDER BY created_at ASC, rowid ASC"
    );
    let mut comment_query = sqlx::query_as::<_, DbComment>(&comment_sql);
    for id in &ids {
        comment_query = comment_query.bind(*id);
    }
    let mut comments: HashMap<Uuid, Vec<Comment>> = HashMap::new();
    for comment in comment_query.fetch_all(pool).await? {
        comments.entry(comment.task_id).or_default().push(comment.into());
    }

    let now = utc_now();
    rows.into_iter()
        .map(|row| {
            let task_watchers = watchers.remove(&row.id).unwrap_or_default();
            let task_comments = comments.remove(&row.id).unwrap_or_default();
            row.into_task(task_watchers, task_comments, now)
        })
        .collect()
}

pub async fn hydrate_task(pool: &SqlitePool, row: DbTask) -> AppResult<Task> {
    hydrate_tasks(pool, vec![row])
        .await?
        .pop()
        .ok_or_else(|| AppError::internal("task vanished while loading"))
}

pub async fn insert_task(conn: &mut SqliteConnection, task: &DbTask) -> AppResult<()> {
    sqlx::query(&format!(
        "INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(task.id)
    .bind(task.project_id)
    .bind(task.created_by)
    .bind(task.assigned_to)
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.status)
    .bind(&task.priority)
    .bind(task.due_date)
    .bind(task.estimated_hours)
    .bind(task.actual_hours)
    .bind(task.completed_at)
    .bind(&task.tags)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Writes every mutable column of the row back.
pub async fn save_task(conn: &mut SqliteConnection, task: &DbTask) -> AppResult<()> {
    sqlx::query(
        "UPDATE tasks SET assigned_to = ?, title = ?, description = ?, status = ?, priority = ?, \
         due_date = ?, estimated_hours = ?, actual_hours = ?, completed_at = ?, tags = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(task.assigned_to)
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.status)
    .bind(&task.priority)
    .bind(task.due_date)
    .bind(task.estimated_hours)
    .bind(task.actual_hours)
    .bind(task.completed_at)
    .bind(&task.tags)
    .bind(task.updated_at)
    .bind(task.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn add_watcher(conn: &mut SqliteConnection, task_id: Uuid, user_id: Uuid) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO task_watchers (task_id, user_id, added_at) VALUES (?, ?, ?)")
        .bind(task_id)
        .bind(user_id)
        .bind(utc_now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn remove_watcher(conn: &mut SqliteConnection, task_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let removed = sqlx::query("DELETE FROM task_watchers WHERE task_id = ? AND user_id = ?")
        .bind(task_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(removed > 0)
}

pub async fn insert_comment(conn: &mut SqliteConnection, comment: &DbComment) -> AppResult<()> {
    sqlx::query("INSERT INTO task_comments (id, task_id, author_id, content, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(comment.id)
        .bind(comment.task_id)
        .bind(comment.author_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Appends one history entry. Entries are never updated afterwards.
pub async fn append_log(conn: &mut SqliteConnection, entry: NewTaskLog) -> AppResult<()> {
    tracing::debug!(
        task_id = %entry.task_id,
        action = entry.action.as_str(),
        field = entry.field,
        "task history entry"
    );

    sqlx::query(
        "INSERT INTO task_logs (id, task_id, action, field, old_value, new_value, changed_by, description, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(entry.task_id)
    .bind(entry.action.as_str())
    .bind(entry.field)
    .bind(NewTaskLog::column(&entry.old_value))
    .bind(NewTaskLog::column(&entry.new_value))
    .bind(entry.changed_by)
    .bind(entry.description)
    .bind(utc_now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Newest first.
pub async fn fetch_history(pool: &SqlitePool, task_id: Uuid, limit: i64) -> AppResult<Vec<TaskLog>> {
    let rows = sqlx::query_as::<_, DbTaskLog>(
        "SELECT id, task_id, action, field, old_value, new_value, changed_by, description, created_at \
         FROM task_logs WHERE task_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(task_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TaskLog::try_from).collect()
}

pub async fn delete_task_cascade(conn: &mut SqliteConnection, task_id: Uuid) -> AppResult<()> {
    for table in ["task_logs", "task_comments", "task_watchers"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE task_id = ?"))
            .bind(task_id)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
