use std::collections::HashSet;

use uuid::Uuid;

use crate::models::user::Role;

/// The authenticated actor of a request: user id plus the role read from
/// storage for this request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    pub fn is(&self, user_id: Uuid) -> bool {
        self.id == user_id
    }
}

/// Ownership facts about a loaded project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFacts {
    pub owner: Uuid,
    pub members: HashSet<Uuid>,
}

impl ProjectFacts {
    pub fn new(owner: Uuid, members: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            owner,
            members: members.into_iter().collect(),
        }
    }

    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.owner == user_id
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    /// Owner or member.
    pub fn has_access(&self, user_id: Uuid) -> bool {
        self.is_owner(user_id) || self.is_member(user_id)
    }
}

/// Ownership facts about a loaded task and the project it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFacts {
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub project: ProjectFacts,
}

impl TaskFacts {
    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.created_by == user_id
    }

    pub fn is_assignee(&self, user_id: Uuid) -> bool {
        self.assigned_to == Some(user_id)
    }

    /// Creator, assignee, project owner or project member.
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.is_creator(user_id) || self.is_assignee(user_id) || self.project.has_access(user_id)
    }
}
