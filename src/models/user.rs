use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::project::Project;
use crate::models::task::{DbTask, Task, TaskStatus};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const NAME_MAX: usize = 50;

pub const USER_COLUMNS: &str =
    "id, username, name, email, password_hash, role, avatar, is_active, created_at, updated_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Developer => "Developer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Admin" => Ok(Role::Admin),
            "Manager" => Ok(Role::Manager),
            "Developer" => Ok(Role::Developer),
            _ => Err(AppError::bad_request(
                "Invalid role. Must be: Admin, Manager, or Developer",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    #[schema(example = "ada")]
    pub username: String,
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        let role = value
            .role
            .parse::<Role>()
            .map_err(|_| AppError::internal(format!("unknown role '{}' stored for user", value.role)))?;

        Ok(User {
            id: value.id,
            username: value.username,
            name: value.name,
            email: value.email,
            role,
            avatar: value.avatar,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    #[schema(example = "ada")]
    pub username: String,
    #[serde(default)]
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[serde(default)]
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[serde(default)]
    #[schema(example = "S3cureP@ss")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[serde(default)]
    #[schema(example = "S3cureP@ss")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Body of `PUT /users/:id`. `role` is only honoured for Admins editing someone else.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    #[serde(default)]
    #[schema(example = "Manager")]
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub tasks: Vec<Task>,
    pub projects: Vec<Project>,
}

/// User detail; `recentActivity` is only filled in when a user looks at themselves.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_activity: Option<RecentActivity>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserTaskStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub overdue: usize,
    pub created: usize,
    /// Completed share of assigned tasks, in percent with one decimal
    pub completion_rate: f64,
    /// Mean days from creation to completion, one decimal
    pub avg_completion_days: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProjectStats {
    pub owned: i64,
    pub member: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCompletions {
    pub year: i32,
    pub month: u32,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: Uuid,
    pub tasks: UserTaskStats,
    pub projects: UserProjectStats,
    pub monthly_completions: Vec<MonthlyCompletions>,
}

impl UserTaskStats {
    /// `assigned` are the tasks assigned to the user; `created_count` the ones they created.
    pub fn compute(assigned: &[DbTask], created_count: usize, now: DateTime<Utc>) -> Self {
        let mut stats = UserTaskStats {
            total: assigned.len(),
            created: created_count,
            ..Default::default()
        };

        let mut completion_days = Vec::new();
        for task in assigned {
            match task.status() {
                Ok(TaskStatus::Pending) => stats.pending += 1,
                Ok(TaskStatus::InProgress) => stats.in_progress += 1,
                Ok(TaskStatus::Completed) => {
                    stats.completed += 1;
                    if let Some(done) = task.completed_at {
                        let days = (done - task.created_at).num_seconds() as f64 / 86_400.0;
                        completion_days.push(days.max(0.0));
                    }
                }
                Err(_) => {}
            }
            if task.is_overdue(now) {
                stats.overdue += 1;
            }
        }

        if stats.total > 0 {
            stats.completion_rate = round1(stats.completed as f64 / stats.total as f64 * 100.0);
        }
        if !completion_days.is_empty() {
            stats.avg_completion_days =
                round1(completion_days.iter().sum::<f64>() / completion_days.len() as f64);
        }

        stats
    }
}

/// Completed-task counts for the last `months` calendar months, oldest first.
pub fn monthly_completions(assigned: &[DbTask], now: DateTime<Utc>, months: u32) -> Vec<MonthlyCompletions> {
    let mut buckets: Vec<MonthlyCompletions> = Vec::with_capacity(months as usize);
    let (mut year, mut month) = (now.year(), now.month());
    for _ in 0..months {
        buckets.push(MonthlyCompletions { year, month, count: 0 });
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }
    buckets.reverse();

    for done in assigned.iter().filter_map(|task| task.completed_at) {
        if let Some(bucket) = buckets
            .iter_mut()
            .find(|bucket| bucket.year == done.year() && bucket.month == done.month())
        {
            bucket.count += 1;
        }
    }

    buckets
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn task(status: &str, created: DateTime<Utc>, completed: Option<DateTime<Utc>>) -> DbTask {
        DbTask {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            assigned_to: None,
            title: "t".into(),
            description: "d".into(),
            status: status.into(),
            priority: "medium".into(),
            due_date: None,
            estimated_hours: None,
            actual_hours: 0.0,
            completed_at: completed,
            tags: "[]".into(),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::Admin, Role::Manager, Role::Developer] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn task_stats_count_by_status() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let created = now - Duration::days(4);
        let tasks = vec![
            task("pending", created, None),
            task("in-progress", created, None),
            task("completed", created, Some(created + Duration::days(2))),
            task("completed", created, Some(created + Duration::days(4))),
        ];

        let stats = UserTaskStats::compute(&tasks, 3, now);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.created, 3);
        assert_eq!(stats.completion_rate, 50.0);
        assert_eq!(stats.avg_completion_days, 3.0);
    }

    #[test]
    fn empty_stats_do_not_divide_by_zero() {
        let stats = UserTaskStats::compute(&[], 0, Utc::now());
        assert_eq!(stats.completion_rate, 0.0);
        assert_eq!(stats.avg_completion_days, 0.0);
    }

    #[test]
    fn monthly_buckets_wrap_the_year() {
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        let done = Utc.with_ymd_and_hms(2024, 12, 3, 0, 0, 0).unwrap();
        let tasks = vec![task("completed", done - Duration::days(1), Some(done))];

        let months = monthly_completions(&tasks, now, 6);
        assert_eq!(months.len(), 6);
        assert_eq!((months[0].year, months[0].month), (2024, 9));
        assert_eq!((months[5].year, months[5].month), (2025, 2));
        let december = months.iter().find(|m| m.month == 12).unwrap();
        assert_eq!(december.count, 1);
    }
}
