use std::collections::BTreeSet;

use uuid::Uuid;

use super::principal::{ProjectFacts, TaskFacts};

/// A top-level key of a task update body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskField {
    Title,
    Description,
    Status,
    Priority,
    AssignedTo,
    DueDate,
    EstimatedHours,
    ActualHours,
    Tags,
    /// Any key the API does not know; still counts against an assignee.
    Other(String),
}

impl TaskField {
    pub fn from_key(key: &str) -> Self {
        match key {
            "title" => TaskField::Title,
            "description" => TaskField::Description,
            "status" => TaskField::Status,
            "priority" => TaskField::Priority,
            "assignedTo" => TaskField::AssignedTo,
            "dueDate" => TaskField::DueDate,
            "estimatedHours" => TaskField::EstimatedHours,
            "actualHours" => TaskField::ActualHours,
            "tags" => TaskField::Tags,
            other => TaskField::Other(other.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            TaskField::Title => "title",
            TaskField::Description => "description",
            TaskField::Status => "status",
            TaskField::Priority => "priority",
            TaskField::AssignedTo => "assignedTo",
            TaskField::DueDate => "dueDate",
            TaskField::EstimatedHours => "estimatedHours",
            TaskField::ActualHours => "actualHours",
            TaskField::Tags => "tags",
            TaskField::Other(key) => key,
        }
    }

    /// Fields an assignee without other rights may change.
    pub fn is_assignee_editable(&self) -> bool {
        matches!(self, TaskField::Status | TaskField::ActualHours)
    }

    pub fn collect<'a>(keys: impl IntoIterator<Item = &'a String>) -> BTreeSet<TaskField> {
        keys.into_iter().map(|key| TaskField::from_key(key)).collect()
    }
}

/// Something a principal attempts, carrying the facts the rule needs.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    CreateProject,
    ViewProject(&'a ProjectFacts),
    UpdateProject(&'a ProjectFacts),
    DeleteProject(&'a ProjectFacts),
    AddProjectMember(&'a ProjectFacts),
    RemoveProjectMember {
        project: &'a ProjectFacts,
        member: Uuid,
    },
    CreateTask(&'a ProjectFacts),
    ViewTask(&'a TaskFacts),
    UpdateTask {
        task: &'a TaskFacts,
        fields: &'a BTreeSet<TaskField>,
    },
    DeleteTask(&'a TaskFacts),
    AssignTask(&'a TaskFacts),
    ListUsers,
    ViewUser {
        target: Uuid,
    },
    UpdateUser {
        target: Uuid,
    },
    ChangeUserRole {
        target: Uuid,
    },
    ChangeUserStatus {
        target: Uuid,
    },
    DeleteUser {
        target: Uuid,
        owned_projects: i64,
        open_assigned_tasks: i64,
    },
}

impl Action<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateProject => "project.create",
            Action::ViewProject(_) => "project.view",
            Action::UpdateProject(_) => "project.update",
            Action::DeleteProject(_) => "project.delete",
            Action::AddProjectMember(_) => "project.member.add",
            Action::RemoveProjectMember { .. } => "project.member.remove",
            Action::CreateTask(_) => "task.create",
            Action::ViewTask(_) => "task.view",
            Action::UpdateTask { .. } => "task.update",
            Action::DeleteTask(_) => "task.delete",
            Action::AssignTask(_) => "task.assign",
            Action::ListUsers => "user.list",
            Action::ViewUser { .. } => "user.view",
            Action::UpdateUser { .. } => "user.update",
            Action::ChangeUserRole { .. } => "user.role",
            Action::ChangeUserStatus { .. } => "user.status",
            Action::DeleteUser { .. } => "user.delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_and_unknown_keys_are_kept() {
        for key in ["title", "status", "assignedTo", "actualHours", "tags"] {
            assert_eq!(TaskField::from_key(key).key(), key);
        }
        assert_eq!(TaskField::from_key("project"), TaskField::Other("project".into()));
    }

    #[test]
    fn only_status_and_hours_are_assignee_editable() {
        assert!(TaskField::Status.is_assignee_editable());
        assert!(TaskField::ActualHours.is_assignee_editable());
        assert!(!TaskField::Title.is_assignee_editable());
        assert!(!TaskField::Other("status2".into()).is_assignee_editable());
    }
}
