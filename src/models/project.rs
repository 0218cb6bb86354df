use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::ProjectFacts;
use crate::errors::AppError;
use crate::models::task::{DbTask, TaskStatus};
use crate::models::user::{round1, User};
use crate::models::{tags_from_column, Priority};

pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 500;

pub const PROJECT_COLUMNS: &str =
    "id, owner_id, title, description, status, priority, tags, start_date, end_date, created_at, updated_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(AppError::bad_request(format!(
                "Invalid project status '{other}'. Must be: active, completed, or archived"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    #[schema(example = "Website relaunch")]
    pub title: String,
    pub description: String,
    pub owner: Uuid,
    /// Always contains the owner
    pub members: Vec<Uuid>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProject {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub tags: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbProject {
    pub fn status(&self) -> Result<ProjectStatus, AppError> {
        self.status.parse()
    }

    pub fn facts(&self, members: &[Uuid]) -> ProjectFacts {
        ProjectFacts::new(self.owner_id, members.iter().copied())
    }

    pub fn into_project(self, members: Vec<Uuid>) -> Result<Project, AppError> {
        Ok(Project {
            status: self.status()?,
            priority: self.priority.parse()?,
            tags: tags_from_column(&self.tags)?,
            id: self.id,
            title: self.title,
            description: self.description,
            owner: self.owner_id,
            members,
            start_date: self.start_date,
            end_date: self.end_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreateRequest {
    #[serde(default)]
    #[schema(example = "Website relaunch")]
    pub title: String,
    #[serde(default)]
    #[schema(example = "Rebuild the marketing site")]
    pub description: String,
    pub priority: Option<Priority>,
    #[schema(format = DateTime, example = "2025-12-01T00:00:00Z")]
    pub end_date: Option<DateTime<Utc>>,
    /// Extra members; the creator is always added
    pub members: Option<Vec<Uuid>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    #[schema(format = DateTime)]
    pub end_date: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMembers {
    pub owner: User,
    pub members: Vec<User>,
    pub total_members: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: Uuid,
    pub title: String,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub team_members_count: usize,
    pub completion_percentage: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub overdue: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct PriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub project: ProjectSummary,
    pub tasks: TaskCounts,
    pub priority: PriorityCounts,
}

impl ProjectStats {
    pub fn compute(project: &Project, tasks: &[DbTask], now: DateTime<Utc>) -> Self {
        let mut counts = TaskCounts {
            total: tasks.len(),
            ..Default::default()
        };
        let mut priority = PriorityCounts::default();

        for task in tasks {
            match task.status() {
                Ok(TaskStatus::Pending) => counts.pending += 1,
                Ok(TaskStatus::InProgress) => counts.in_progress += 1,
                Ok(TaskStatus::Completed) => counts.completed += 1,
                Err(_) => {}
            }
            match task.priority.parse::<Priority>() {
                Ok(Priority::High) => priority.high += 1,
                Ok(Priority::Medium) => priority.medium += 1,
                Ok(Priority::Low) => priority.low += 1,
                Err(_) => {}
            }
            if task.is_overdue(now) {
                counts.overdue += 1;
            }
        }

        let completion_percentage = if counts.total == 0 {
            0.0
        } else {
            round1(counts.completed as f64 / counts.total as f64 * 100.0)
        };

        ProjectStats {
            project: ProjectSummary {
                id: project.id,
                title: project.title.clone(),
                status: project.status,
                priority: project.priority,
                team_members_count: project.members.len(),
                completion_percentage,
            },
            tasks: counts,
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn project(members: Vec<Uuid>) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            title: "T".into(),
            description: "D".into(),
            owner: members[0],
            members,
            status: ProjectStatus::Active,
            priority: Priority::Medium,
            tags: vec![],
            start_date: now,
            end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn task(status: &str, priority: &str, due: Option<DateTime<Utc>>) -> DbTask {
        let now = Utc::now();
        DbTask {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            assigned_to: None,
            title: "t".into(),
            description: "d".into(),
            status: status.into(),
            priority: priority.into(),
            due_date: due,
            estimated_hours: None,
            actual_hours: 0.0,
            completed_at: (status == "completed").then_some(now),
            tags: "[]".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stats_split_by_status_and_priority() {
        let now = Utc::now();
        let p = project(vec![Uuid::new_v4(), Uuid::new_v4()]);
        let tasks = vec![
            task("pending", "high", Some(now - Duration::days(1))),
            task("in-progress", "low", None),
            task("completed", "high", Some(now - Duration::days(3))),
        ];

        let stats = ProjectStats::compute(&p, &tasks, now);
        assert_eq!(stats.tasks.total, 3);
        assert_eq!(stats.tasks.completed, 1);
        // completed tasks are never overdue
        assert_eq!(stats.tasks.overdue, 1);
        assert_eq!(stats.priority.high, 2);
        assert_eq!(stats.priority.low, 1);
        assert_eq!(stats.project.team_members_count, 2);
        assert_eq!(stats.project.completion_percentage, 33.3);
    }

    #[test]
    fn empty_project_has_zero_completion() {
        let p = project(vec![Uuid::new_v4()]);
        let stats = ProjectStats::compute(&p, &[], Utc::now());
        assert_eq!(stats.project.completion_percentage, 0.0);
    }
}
