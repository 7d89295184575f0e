use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use campusops_core::RequestId;
use campusops_lending::ItemKind;

use crate::app::{SharedService, dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requests).post(submit_request))
        .route(
            "/:id",
            get(get_request).patch(change_status).delete(delete_request),
        )
}

pub async fn list_requests(
    Extension(services): Extension<SharedService>,
    Extension(kind): Extension<ItemKind>,
    Extension(ctx): Extension<ActorContext>,
    Query(query): Query<dto::ListRequestsQuery>,
) -> axum::response::Response {
    let status = match query.status() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.list_requests(ctx.actor(), kind, status).await {
        Ok(rows) => {
            let views: Vec<dto::RequestView> = rows.iter().map(dto::RequestView::from).collect();
            Json(views).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn submit_request(
    Extension(services): Extension<SharedService>,
    Extension(kind): Extension<ItemKind>,
    Extension(ctx): Extension<ActorContext>,
    payload: Result<Json<dto::SubmitRequestBody>, JsonRejection>,
) -> axum::response::Response {
    let submission = match dto::body(payload).and_then(dto::SubmitRequestBody::into_submission) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.submit_request(ctx.actor(), kind, submission).await {
        Ok(details) => (StatusCode::CREATED, Json(dto::RequestView::from(&details))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_request(
    Extension(services): Extension<SharedService>,
    Extension(kind): Extension<ItemKind>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get_request(ctx.actor(), kind, id).await {
        Ok(details) => Json(dto::RequestView::from(&details)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn change_status(
    Extension(services): Extension<SharedService>,
    Extension(kind): Extension<ItemKind>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::ChangeStatusBody>, JsonRejection>,
) -> axum::response::Response {
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let change = match dto::body(payload).and_then(dto::ChangeStatusBody::into_change) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.change_status(ctx.actor(), kind, id, change).await {
        Ok(details) => Json(dto::RequestView::from(&details)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_request(
    Extension(services): Extension<SharedService>,
    Extension(kind): Extension<ItemKind>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.delete_request(ctx.actor(), kind, id).await {
        Ok(()) => Json(serde_json::json!({ "deleted": id })).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
