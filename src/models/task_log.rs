use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskLogAction {
    Created,
    Updated,
    StatusChanged,
    Assigned,
    Unassigned,
    CommentAdded,
    PriorityChanged,
    DueDateChanged,
    Completed,
    Reopened,
}

impl TaskLogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskLogAction::Created => "created",
            TaskLogAction::Updated => "updated",
            TaskLogAction::StatusChanged => "status_changed",
            TaskLogAction::Assigned => "assigned",
            TaskLogAction::Unassigned => "unassigned",
            TaskLogAction::CommentAdded => "comment_added",
            TaskLogAction::PriorityChanged => "priority_changed",
            TaskLogAction::DueDateChanged => "due_date_changed",
            TaskLogAction::Completed => "completed",
            TaskLogAction::Reopened => "reopened",
        }
    }
}

impl fmt::Display for TaskLogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskLogAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let action = match value {
            "created" => TaskLogAction::Created,
            "updated" => TaskLogAction::Updated,
            "status_changed" => TaskLogAction::StatusChanged,
            "assigned" => TaskLogAction::Assigned,
            "unassigned" => TaskLogAction::Unassigned,
            "comment_added" => TaskLogAction::CommentAdded,
            "priority_changed" => TaskLogAction::PriorityChanged,
            "due_date_changed" => TaskLogAction::DueDateChanged,
            "completed" => TaskLogAction::Completed,
            "reopened" => TaskLogAction::Reopened,
            other => return Err(AppError::internal(format!("unknown task log action '{other}'"))),
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskLog {
    pub id: Uuid,
    pub task: Uuid,
    pub action: TaskLogAction,
    pub field: Option<String>,
    #[schema(value_type = Object, nullable)]
    pub old_value: Option<Value>,
    #[schema(value_type = Object, nullable)]
    pub new_value: Option<Value>,
    pub changed_by: Uuid,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTaskLog {
    pub id: Uuid,
    pub task_id: Uuid,
    pub action: String,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Uuid,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbTaskLog> for TaskLog {
    type Error = AppError;

    fn try_from(value: DbTaskLog) -> Result<Self, Self::Error> {
        Ok(TaskLog {
            action: value.action.parse()?,
            old_value: parse_value(value.old_value.as_deref())?,
            new_value: parse_value(value.new_value.as_deref())?,
            id: value.id,
            task: value.task_id,
            field: value.field,
            changed_by: value.changed_by,
            description: value.description,
            created_at: value.created_at,
        })
    }
}

fn parse_value(raw: Option<&str>) -> Result<Option<Value>, AppError> {
    raw.map(serde_json::from_str)
        .transpose()
        .map_err(|err| AppError::internal(format!("invalid task log value: {err}")))
}

/// A history entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewTaskLog {
    pub task_id: Uuid,
    pub action: TaskLogAction,
    pub changed_by: Uuid,
    pub field: Option<&'static str>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub description: Option<String>,
}

impl NewTaskLog {
    pub fn new(task_id: Uuid, action: TaskLogAction, changed_by: Uuid) -> Self {
        Self {
            task_id,
            action,
            changed_by,
            field: None,
            old_value: None,
            new_value: None,
            description: None,
        }
    }

    pub fn change<T: Serialize>(mut self, field: &'static str, old: T, new: T) -> Self {
        self.field = Some(field);
        self.old_value = Some(serde_json::to_value(old).unwrap_or_default());
        self.new_value = Some(serde_json::to_value(new).unwrap_or_default());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// JSON text for the value columns; `null` values are stored as NULL.
    pub(crate) fn column(value: &Option<Value>) -> Option<String> {
        value
            .as_ref()
            .filter(|value| !value.is_null())
            .map(Value::to_string)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}
