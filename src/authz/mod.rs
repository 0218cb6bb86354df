//! Authorization module - permission evaluator and listing scopes
//!
//! Every decision about who may touch a project, task or user account goes
//! through [`PolicyEvaluator::evaluate`]. Handlers load the entity facts first,
//! describe the attempt as an [`Action`] and turn a denial into an HTTP error.
//!
//! Evaluation never performs I/O; the role on the [`Principal`] is the one
//! re-read from storage for the current request.

mod action;
mod evaluator;
mod principal;
mod scope;

pub use action::{Action, TaskField};
pub use evaluator::{Decision, DefaultPolicyEvaluator, DenyReason, PolicyEvaluator};
pub use principal::{Principal, ProjectFacts, TaskFacts};
pub use scope::{directory_roles, project_scope, task_scope, ProjectScope, TaskScope};
