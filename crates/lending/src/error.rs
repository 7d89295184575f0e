use thiserror::Error;

use campusops_core::{DomainError, Money};

use crate::RequestStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LendingError {
    /// No edge in the transition table allows this move for this actor.
    #[error("cannot move request from {from} to {to}: {reason}")]
    IllegalTransition {
        from: RequestStatus,
        to: RequestStatus,
        reason: String,
    },

    #[error("request cannot be deleted while {status}: {reason}")]
    NotDeletable { status: RequestStatus, reason: String },

    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: i64, available: i64 },

    #[error("a fine of {fine} must be verified as paid before the item can be returned")]
    PaymentNotVerified { fine: Money },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LendingError {
    pub fn illegal(from: RequestStatus, to: RequestStatus, reason: impl Into<String>) -> Self {
        Self::IllegalTransition {
            from,
            to,
            reason: reason.into(),
        }
    }
}
