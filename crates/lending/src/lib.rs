//! Lending domain module: inventory reservation and request lifecycle.
//!
//! This crate contains the business rules for library items and lab
//! components, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage). Callers pass `now` explicitly.

pub mod error;
pub mod item;
pub mod policy;
pub mod request;
pub mod transition;

pub use error::LendingError;
pub use item::{Item, ItemKind, NewItem};
pub use policy::LendingPolicy;
pub use request::{LendingRequest, NewRequest, RequestStatus};
pub use transition::{
    StatusChange, TransitionOutcome, allowed_targets, decide, ensure_deletable, refresh_overdue,
};
