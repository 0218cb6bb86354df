use serde_json::{json, Value};

use super::action::{Action, TaskField};
use super::principal::Principal;

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn allow_if(condition: bool, reason: DenyReason) -> Self {
        if condition {
            Decision::Allow
        } else {
            Decision::Deny(reason)
        }
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenyReason {
    #[error("Not authorized to access this project")]
    NotProjectParticipant,
    #[error("Only the project owner can {verb} this project")]
    NotProjectOwner { verb: &'static str },
    #[error("Not authorized to manage members of this project")]
    CannotManageMembers,
    #[error("Cannot remove the project owner from the project")]
    OwnerRemoval,
    #[error("Not authorized to create tasks in this project")]
    CannotCreateTask,
    #[error("Not authorized to access this task")]
    NotTaskParticipant,
    #[error("Not authorized to update this task")]
    CannotUpdateTask,
    #[error("Assignees may only update status and actualHours (rejected: {})", .rejected.join(", "))]
    AssigneeFieldRestriction { rejected: Vec<String> },
    #[error("Not authorized to delete this task")]
    CannotDeleteTask,
    #[error("Not authorized to assign this task")]
    CannotAssignTask,
    #[error("Access denied. {required} role required.")]
    RoleRequired { required: &'static str },
    #[error("Not authorized to {verb} this user")]
    OtherUser { verb: &'static str },
    #[error("Cannot change your own role")]
    SelfRoleChange,
    #[error("Cannot delete your own account")]
    SelfDeletion,
    #[error("Cannot delete user with active projects or tasks. Please reassign them first.")]
    UserHasActiveWork {
        owned_projects: i64,
        open_assigned_tasks: i64,
    },
}

impl DenyReason {
    /// Rights failures are 403; business-rule refusals are 400.
    pub fn is_forbidden(&self) -> bool {
        !matches!(
            self,
            DenyReason::OwnerRemoval
                | DenyReason::SelfRoleChange
                | DenyReason::SelfDeletion
                | DenyReason::UserHasActiveWork { .. }
        )
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            DenyReason::UserHasActiveWork {
                owned_projects,
                open_assigned_tasks,
            } => Some(json!({
                "ownedProjects": owned_projects,
                "assignedTasks": open_assigned_tasks,
            })),
            DenyReason::AssigneeFieldRestriction { rejected } => Some(json!({ "fields": rejected })),
            _ => None,
        }
    }
}

/// Permission rules over `(Principal, Action)`.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, principal: &Principal, action: &Action<'_>) -> Decision;

    fn authorize(&self, principal: &Principal, action: &Action<'_>) -> Result<(), DenyReason> {
        match self.evaluate(principal, action) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Role, ownership, membership and assignment rules.
///
/// Changing one's own role and deleting one's own account are refused before
/// any role check, Admin included. Owner removal is refused once the caller
/// may manage members. Otherwise any satisfied rule grants access.
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn decide(principal: &Principal, action: &Action<'_>) -> Decision {
        let me = principal.id;
        let admin = principal.is_admin();
        let manager = principal.is_manager();

        match *action {
            Action::CreateProject => Decision::Allow,
            Action::ViewProject(project) => {
                Decision::allow_if(admin || project.has_access(me), DenyReason::NotProjectParticipant)
            }
            Action::UpdateProject(project) => Decision::allow_if(
                admin || project.is_owner(me),
                DenyReason::NotProjectOwner { verb: "update" },
            ),
            Action::DeleteProject(project) => Decision::allow_if(
                admin || project.is_owner(me),
                DenyReason::NotProjectOwner { verb: "delete" },
            ),
            Action::AddProjectMember(project) => Decision::allow_if(
                admin || manager || project.is_owner(me),
                DenyReason::CannotManageMembers,
            ),
            Action::RemoveProjectMember { project, member } => {
                if !(admin || manager || project.is_owner(me)) {
                    Decision::Deny(DenyReason::CannotManageMembers)
                } else if project.is_owner(member) {
                    Decision::Deny(DenyReason::OwnerRemoval)
                } else {
                    Decision::Allow
                }
            }
            Action::CreateTask(project) => Decision::allow_if(
                admin || manager || project.has_access(me),
                DenyReason::CannotCreateTask,
            ),
            Action::ViewTask(task) => {
                Decision::allow_if(admin || task.is_participant(me), DenyReason::NotTaskParticipant)
            }
            Action::UpdateTask { task, fields } => {
                if admin || manager || task.is_creator(me) || task.project.is_owner(me) {
                    Decision::Allow
                } else if task.is_assignee(me) {
                    let rejected: Vec<String> = fields
                        .iter()
                        .filter(|field| !field.is_assignee_editable())
                        .map(|field| TaskField::key(field).to_string())
                        .collect();
                    Decision::allow_if(
                        rejected.is_empty(),
                        DenyReason::AssigneeFieldRestriction { rejected },
                    )
                } else {
                    Decision::Deny(DenyReason::CannotUpdateTask)
                }
            }
            Action::DeleteTask(task) => Decision::allow_if(
                admin || manager || task.is_creator(me) || task.project.is_owner(me),
                DenyReason::CannotDeleteTask,
            ),
            Action::AssignTask(task) => Decision::allow_if(
                admin || manager || task.project.is_owner(me) || task.is_creator(me),
                DenyReason::CannotAssignTask,
            ),
            Action::ListUsers => Decision::allow_if(
                admin || manager,
                DenyReason::RoleRequired {
                    required: "Manager or Admin",
                },
            ),
            Action::ViewUser { target } => Decision::allow_if(
                admin || manager || principal.is(target),
                DenyReason::OtherUser { verb: "view" },
            ),
            Action::UpdateUser { target } => Decision::allow_if(
                admin || principal.is(target),
                DenyReason::OtherUser { verb: "update" },
            ),
            Action::ChangeUserRole { target } => {
                if principal.is(target) {
                    Decision::Deny(DenyReason::SelfRoleChange)
                } else if !admin {
                    Decision::Deny(DenyReason::RoleRequired { required: "Admin" })
                } else {
                    Decision::Allow
                }
            }
            Action::ChangeUserStatus { .. } => {
                Decision::allow_if(admin, DenyReason::RoleRequired { required: "Admin" })
            }
            Action::DeleteUser {
                target,
                owned_projects,
                open_assigned_tasks,
            } => {
                if principal.is(target) {
                    Decision::Deny(DenyReason::SelfDeletion)
                } else if !admin {
                    Decision::Deny(DenyReason::RoleRequired { required: "Admin" })
                } else if owned_projects > 0 || open_assigned_tasks > 0 {
                    Decision::Deny(DenyReason::UserHasActiveWork {
                        owned_projects,
                        open_assigned_tasks,
                    })
                } else {
                    Decision::Allow
                }
            }
        }
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn evaluate(&self, principal: &Principal, action: &Action<'_>) -> Decision {
        let decision = Self::decide(principal, action);

        match &decision {
            Decision::Allow => tracing::debug!(
                user_id = %principal.id,
                role = %principal.role,
                action = action.name(),
                "permission granted"
            ),
            Decision::Deny(reason) => tracing::debug!(
                user_id = %principal.id,
                role = %principal.role,
                action = action.name(),
                reason = %reason,
                "permission denied"
            ),
        }

        decision
    }
}
