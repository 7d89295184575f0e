//! `campusops-auth`: actor model and authorization gate.
//!
//! This crate is intentionally decoupled from HTTP and storage: the API layer
//! resolves an [`Actor`] from the request, and the checks here are pure.

pub mod actor;
pub mod authorize;
pub mod roles;

pub use actor::Actor;
pub use authorize::{AuthzError, RequestScope, authorize_item_management, authorize_request_access};
pub use roles::Role;
