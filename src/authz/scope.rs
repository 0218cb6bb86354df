use uuid::Uuid;

use super::principal::Principal;
use crate::models::user::Role;

/// Which projects a principal sees when listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectScope {
    All,
    OwnedOrMember(Uuid),
    MemberOf(Uuid),
}

/// Which tasks a principal sees when listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    All,
    /// Tasks of every project the user owns or is a member of
    InProjectsOf(Uuid),
    AssignedOrCreated(Uuid),
}

pub fn project_scope(principal: &Principal) -> ProjectScope {
    match principal.role {
        Role::Admin => ProjectScope::All,
        Role::Manager => ProjectScope::OwnedOrMember(principal.id),
        Role::Developer => ProjectScope::MemberOf(principal.id),
    }
}

pub fn task_scope(principal: &Principal) -> TaskScope {
    match principal.role {
        Role::Admin => TaskScope::All,
        Role::Manager => TaskScope::InProjectsOf(principal.id),
        Role::Developer => TaskScope::AssignedOrCreated(principal.id),
    }
}

/// Roles visible in the simple user directory; `None` means every role.
pub fn directory_roles(principal: &Principal) -> Option<&'static [Role]> {
    match principal.role {
        Role::Developer => Some(&[Role::Developer, Role::Manager]),
        Role::Admin | Role::Manager => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_follow_role() {
        let id = Uuid::new_v4();
        let admin = Principal::new(id, Role::Admin);
        let manager = Principal::new(id, Role::Manager);
        let dev = Principal::new(id, Role::Developer);

        assert_eq!(project_scope(&admin), ProjectScope::All);
        assert_eq!(project_scope(&manager), ProjectScope::OwnedOrMember(id));
        assert_eq!(project_scope(&dev), ProjectScope::MemberOf(id));

        assert_eq!(task_scope(&admin), TaskScope::All);
        assert_eq!(task_scope(&manager), TaskScope::InProjectsOf(id));
        assert_eq!(task_scope(&dev), TaskScope::AssignedOrCreated(id));
    }

    #[test]
    fn developers_do_not_see_admins_in_directory() {
        let dev = Principal::new(Uuid::new_v4(), Role::Developer);
        let roles = directory_roles(&dev).unwrap();
        assert!(!roles.contains(&Role::Admin));
        assert!(directory_roles(&Principal::new(Uuid::new_v4(), Role::Manager)).is_none());
    }
}
