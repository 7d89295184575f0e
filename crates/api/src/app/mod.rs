//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP handlers, one file per resource family
//! - `dto.rs`: request bodies and JSON views
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use campusops_infra::{LendingService, LendingStore};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// The lending service as shared by handlers, over any store backend.
pub type SharedService = Arc<LendingService<Arc<dyn LendingStore>>>;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(service: SharedService) -> Router {
    let auth_state = middleware::AuthState {
        service: service.clone(),
    };

    // Protected routes: require a resolvable x-user-id.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                auth_state,
                middleware::auth_middleware,
            ))
            .layer(Extension(service)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(axum::middleware::from_fn(middleware::log_requests))
}
