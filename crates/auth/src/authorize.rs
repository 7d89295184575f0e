use thiserror::Error;

use campusops_core::{DomainId, StudentId};

use crate::{Actor, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("access denied: request belongs to another student")]
    NotOwner,

    #[error("access denied: not assigned to this domain")]
    NotCoordinator,

    #[error("access denied: role {0} cannot {1}")]
    RoleNotPermitted(Role, &'static str),
}

/// What an actor is trying to touch when acting on a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestScope {
    /// Student who filed the request.
    pub student_id: StudentId,
    /// Domain of the requested item, if it has one.
    pub item_domain: Option<DomainId>,
}

/// Gate for reading or acting on a single request.
///
/// - No IO
/// - No panics
/// - No transition logic (that lives in the lending table)
pub fn authorize_request_access(actor: &Actor, scope: &RequestScope) -> Result<(), AuthzError> {
    match actor {
        Actor::Admin { .. } => Ok(()),
        Actor::Student { student_id, .. } => {
            if *student_id == scope.student_id {
                Ok(())
            } else {
                Err(AuthzError::NotOwner)
            }
        }
        Actor::Faculty { .. } => {
            if actor.coordinates(scope.item_domain) {
                Ok(())
            } else {
                Err(AuthzError::NotCoordinator)
            }
        }
    }
}

/// Gate for creating inventory items.
///
/// Admins may stock anything. Faculty may only stock domains they coordinate;
/// items without a domain are admin-managed.
pub fn authorize_item_management(actor: &Actor, domain: Option<DomainId>) -> Result<(), AuthzError> {
    match (actor, domain) {
        (Actor::Admin { .. }, _) => Ok(()),
        (Actor::Student { .. }, _) => Err(AuthzError::RoleNotPermitted(Role::Student, "manage inventory")),
        (Actor::Faculty { .. }, None) => Err(AuthzError::NotCoordinator),
        (Actor::Faculty { .. }, Some(d)) => {
            if actor.coordinates(Some(d)) {
                Ok(())
            } else {
                Err(AuthzError::NotCoordinator)
            }
        }
    }
}
