use std::collections::HashMap;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::authz::ProjectFacts;
use crate::errors::{AppError, AppResult};
use crate::models::project::{DbProject, Project, PROJECT_COLUMNS};
use crate::utils::utc_now;

/// A project row together with its member ids.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub row: DbProject,
    pub members: Vec<Uuid>,
}

impl LoadedProject {
    pub fn id(&self) -> Uuid {
        self.row.id
    }

    pub fn facts(&self) -> ProjectFacts {
        self.row.facts(&self.members)
    }

    pub fn into_project(self) -> AppResult<Project> {
        self.row.into_project(self.members)
    }
}

pub async fn fetch_project(pool: &SqlitePool, id: Uuid) -> AppResult<LoadedProject> {
    let row = sqlx::query_as::<_, DbProject>(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Project not found"))?;

    let members = fetch_member_ids(pool, id).await?;
    Ok(LoadedProject { row, members })
}

pub async fn fetch_member_ids(pool: &SqlitePool, project_id: Uuid) -> AppResult<Vec<Uuid>> {
    let members = sqlx::query_scalar(
        "SELECT user_id FROM project_members WHERE project_id = ? ORDER BY added_at ASC, rowid ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(members)
}

/// Member ids for several projects at once.
pub async fn members_by_project(pool: &SqlitePool, project_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<Uuid>>> {
    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    if project_ids.is_empty() {
        return Ok(map);
    }

    let sql = format!(
        "SELECT project_id, user_id FROM project_members WHERE project_id IN ({}) ORDER BY added_at ASC, rowid ASC",
        super::placeholders(project_ids.len())
    );
    let mut query = sqlx::query_as::<_, (Uuid, Uuid)>(&sql);
    for id in project_ids {
        query = query.bind(*id);
    }

    for (project_id, user_id) in query.fetch_all(pool).await? {
        map.entry(project_id).or_default().push(user_id);
    }
    Ok(map)
}

/// Attaches member lists to project rows, keeping row order.
pub async fn hydrate_projects(pool: &SqlitePool, rows: Vec<DbProject>) -> AppResult<Vec<Project>> {
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut members = members_by_project(pool, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let list = members.remove(&row.id).unwrap_or_default();
            row.into_project(list)
        })
        .collect()
}

/// Ids of every project the user owns or is a member of.
pub async fn accessible_project_ids(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar(
        "SELECT id FROM projects WHERE owner_id = ? \
         UNION SELECT project_id FROM project_members WHERE user_id = ?",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn add_member(conn: &mut SqliteConnection, project_id: Uuid, user_id: Uuid) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO project_members (project_id, user_id, added_at) VALUES (?, ?, ?)")
        .bind(project_id)
        .bind(user_id)
        .bind(utc_now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn touch(conn: &mut SqliteConnection, project_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
        .bind(utc_now())
        .bind(project_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Removes the project with its tasks, their history, comments and watchers.
/// Returns the number of tasks removed.
pub async fn delete_project_cascade(conn: &mut SqliteConnection, project_id: Uuid) -> AppResult<u64> {
    const TASK_CHILDREN: [&str; 3] = ["task_logs", "task_comments", "task_watchers"];

    for table in TASK_CHILDREN {
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE task_id IN (SELECT id FROM tasks WHERE project_id = ?)"
        ))
        .bind(project_id)
        .execute(&mut *conn)
        .await?;
    }

    let tasks = sqlx::query("DELETE FROM tasks WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM project_members WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(&mut *conn)
        .await?;

    Ok(tasks)
}
