use serde::Serialize;

use campusops_core::{DomainId, FacultyId, StudentId, UserId};

use crate::Role;

/// A fully resolved, authenticated actor.
///
/// Construction is left to whoever owns the user directory (the store); the
/// variant carries exactly the profile data each role's checks need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Student {
        user_id: UserId,
        student_id: StudentId,
    },
    Faculty {
        user_id: UserId,
        faculty_id: FacultyId,
        /// Domains this faculty member coordinates.
        coordinated_domains: Vec<DomainId>,
    },
    Admin {
        user_id: UserId,
    },
}

impl Actor {
    pub fn role(&self) -> Role {
        match self {
            Actor::Student { .. } => Role::Student,
            Actor::Faculty { .. } => Role::Faculty,
            Actor::Admin { .. } => Role::Admin,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Actor::Student { user_id, .. }
            | Actor::Faculty { user_id, .. }
            | Actor::Admin { user_id } => *user_id,
        }
    }

    pub fn student_id(&self) -> Option<StudentId> {
        match self {
            Actor::Student { student_id, .. } => Some(*student_id),
            _ => None,
        }
    }

    pub fn faculty_id(&self) -> Option<FacultyId> {
        match self {
            Actor::Faculty { faculty_id, .. } => Some(*faculty_id),
            _ => None,
        }
    }

    /// Whether this actor coordinates `domain`.
    ///
    /// Items with no domain are open to every coordinator. Admins coordinate
    /// everything; students nothing.
    pub fn coordinates(&self, domain: Option<DomainId>) -> bool {
        match self {
            Actor::Admin { .. } => true,
            Actor::Student { .. } => false,
            Actor::Faculty {
                coordinated_domains,
                ..
            } => match domain {
                None => true,
                Some(d) => coordinated_domains.contains(&d),
            },
        }
    }
}
