use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, User, USER_COLUMNS};

pub async fn fetch_user(pool: &SqlitePool, id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

pub async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Public view of the given ids, in the order given; unknown ids are skipped.
pub async fn fetch_users(pool: &SqlitePool, ids: &[Uuid]) -> AppResult<Vec<User>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
        super::placeholders(ids.len())
    );
    let mut query = sqlx::query_as::<_, DbUser>(&sql);
    for id in ids {
        query = query.bind(*id);
    }

    let mut rows = query.fetch_all(pool).await?;
    let mut users = Vec::with_capacity(rows.len());
    for id in ids {
        if let Some(pos) = rows.iter().position(|row| row.id == *id) {
            users.push(User::try_from(rows.swap_remove(pos))?);
        }
    }
    Ok(users)
}

pub async fn ensure_user_exists<'e>(executor: impl SqliteExecutor<'e>, id: Uuid) -> AppResult<()> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("User not found"))
}

/// Fails with a conflict when another account already uses the username or email.
pub async fn ensure_identity_available(
    pool: &SqlitePool,
    username: Option<&str>,
    email: Option<&str>,
    except: Option<Uuid>,
) -> AppResult<()> {
    if let Some(username) = username {
        let taken: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;
        if taken.is_some_and(|id| Some(id) != except) {
            return Err(AppError::conflict("username already exists"));
        }
    }

    if let Some(email) = email {
        let taken: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;
        if taken.is_some_and(|id| Some(id) != except) {
            return Err(AppError::conflict("email already exists"));
        }
    }

    Ok(())
}

pub async fn owned_project_count(pool: &SqlitePool, user_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(1) FROM projects WHERE owner_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn member_project_count(pool: &SqlitePool, user_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(1) FROM project_members WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn open_assigned_task_count(pool: &SqlitePool, user_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(1) FROM tasks WHERE assigned_to = ? AND status != 'completed'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
