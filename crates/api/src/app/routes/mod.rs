use axum::{Extension, Router, routing::get};

use campusops_lending::ItemKind;

pub mod items;
pub mod requests;
pub mod system;

/// Router for all endpoints that need a resolved actor.
///
/// Library items and lab components share handlers; the kind is injected per
/// subtree, so a request or item is only reachable under its own kind's paths.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest(
            "/library-items",
            items::router().layer(Extension(ItemKind::LibraryItem)),
        )
        .nest(
            "/lab-components",
            items::router().layer(Extension(ItemKind::LabComponent)),
        )
        .nest(
            "/library-requests",
            requests::router().layer(Extension(ItemKind::LibraryItem)),
        )
        .nest(
            "/component-requests",
            requests::router().layer(Extension(ItemKind::LabComponent)),
        )
}
