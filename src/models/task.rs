use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{ProjectFacts, TaskFacts};
use crate::errors::AppError;
use crate::models::comment::Comment;
use crate::models::user::round1;
use crate::models::{tags_from_column, Priority};

pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 1000;

pub const TASK_COLUMNS: &str = "id, project_id, created_by, assigned_to, title, description, status, priority, \
     due_date, estimated_hours, actual_hours, completed_at, tags, created_at, updated_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }

    /// The `completed_at` stamp a task must carry after moving from `self` to `next`.
    ///
    /// Entering `completed` stamps `now`, leaving it clears the stamp and a
    /// completed-to-completed write keeps the existing one.
    pub fn completion_stamp(
        self,
        next: TaskStatus,
        current: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match (self, next) {
            (TaskStatus::Completed, TaskStatus::Completed) => current.or(Some(now)),
            (_, TaskStatus::Completed) => Some(now),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            _ => Err(AppError::bad_request(
                "Invalid status. Must be: pending, in-progress, or completed",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    #[schema(example = "Write release notes")]
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub project: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    #[schema(format = DateTime, example = "2025-10-10T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: f64,
    pub completed_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub watchers: Vec<Uuid>,
    pub comments: Vec<Comment>,
    pub is_overdue: bool,
    pub progress_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTask {
    pub id: Uuid,
    pub project_id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: f64,
    pub completed_at: Option<DateTime<Utc>>,
    pub tags: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbTask {
    pub fn status(&self) -> Result<TaskStatus, AppError> {
        self.status.parse()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status(), Ok(TaskStatus::Completed))
    }

    /// Due date in the past and not completed yet.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) => due < now && !self.is_completed(),
            None => false,
        }
    }

    /// Spent hours against the estimate, capped at 100. Without an estimate
    /// the task is either done (100) or not (0).
    pub fn progress_percentage(&self) -> f64 {
        match self.estimated_hours {
            Some(estimate) if estimate > 0.0 => round1((self.actual_hours / estimate * 100.0).min(100.0)),
            _ if self.is_completed() => 100.0,
            _ => 0.0,
        }
    }

    pub fn facts(&self, project: ProjectFacts) -> TaskFacts {
        TaskFacts {
            created_by: self.created_by,
            assigned_to: self.assigned_to,
            project,
        }
    }

    pub fn into_task(
        self,
        watchers: Vec<Uuid>,
        comments: Vec<Comment>,
        now: DateTime<Utc>,
    ) -> Result<Task, AppError> {
        let is_overdue = self.is_overdue(now);
        let progress_percentage = self.progress_percentage();

        Ok(Task {
            status: self.status()?,
            priority: self.priority.parse()?,
            tags: tags_from_column(&self.tags)?,
            id: self.id,
            title: self.title,
            description: self.description,
            project: self.project_id,
            created_by: self.created_by,
            assigned_to: self.assigned_to,
            due_date: self.due_date,
            estimated_hours: self.estimated_hours,
            actual_hours: self.actual_hours,
            completed_at: self.completed_at,
            watchers,
            comments,
            is_overdue,
            progress_percentage,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreateRequest {
    #[serde(default)]
    #[schema(example = "Write release notes")]
    pub title: String,
    #[serde(default)]
    #[schema(example = "Summarise the changes for 1.2")]
    pub description: String,
    /// Required on `POST /tasks`, taken from the path on `POST /projects/:id/tasks`
    pub project: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    #[schema(format = DateTime, example = "2025-10-10T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub tags: Option<Vec<String>>,
}

/// Body of `PUT /tasks/:id`. Which keys were sent matters for authorization,
/// so handlers also keep the raw key set.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// `null` unassigns
    pub assigned_to: Option<Uuid>,
    /// `null` clears the due date
    #[schema(format = DateTime)]
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskStatusRequest {
    #[serde(default)]
    #[schema(example = "in-progress")]
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignTaskRequest {
    /// Omit or send `null` to unassign
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub actual_hours: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WatcherRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub project: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
}
