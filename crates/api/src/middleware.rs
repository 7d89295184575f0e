use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use campusops_core::UserId;

use crate::app::{SharedService, errors};
use crate::context::ActorContext;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AuthState {
    pub service: SharedService,
}

/// Resolve `x-user-id` to an actor, or answer 401.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(user_id) = extract_user_id(req.headers()) else {
        return errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            format!("missing or malformed {USER_ID_HEADER} header"),
        );
    };

    let actor = match state.service.resolve_actor(user_id).await {
        Ok(actor) => actor,
        Err(e) => return errors::service_error_to_response(e),
    };

    req.extensions_mut().insert(ActorContext::new(actor));
    next.run(req).await
}

/// One log line per request with method, path, status and latency.
pub async fn log_requests(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

fn extract_user_id(headers: &HeaderMap) -> Option<UserId> {
    let raw = headers.get(USER_ID_HEADER)?.to_str().ok()?;
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn user_id_header_is_trimmed_and_parsed() {
        let id = UserId::new();
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(&format!(" {id} ")).unwrap());
        assert_eq!(extract_user_id(&headers), Some(id));
    }

    #[test]
    fn missing_or_garbage_header_yields_none() {
        assert_eq!(extract_user_id(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("admin"));
        assert_eq!(extract_user_id(&headers), None);
    }
}
