use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use campusops_core::ItemId;
use campusops_lending::ItemKind;

use crate::app::{SharedService, dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/:id", get(get_item))
}

pub async fn list_items(
    Extension(services): Extension<SharedService>,
    Extension(kind): Extension<ItemKind>,
) -> axum::response::Response {
    match services.list_items(kind).await {
        Ok(items) => {
            let views: Vec<dto::ItemView> = items.iter().map(dto::ItemView::from).collect();
            Json(views).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_item(
    Extension(services): Extension<SharedService>,
    Extension(kind): Extension<ItemKind>,
    Extension(ctx): Extension<ActorContext>,
    payload: Result<Json<dto::CreateItemBody>, JsonRejection>,
) -> axum::response::Response {
    let new_item = match dto::body(payload).and_then(|b| b.into_new_item(kind)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.create_item(ctx.actor(), new_item).await {
        Ok(item) => (StatusCode::CREATED, Json(dto::ItemView::from(&item))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<SharedService>,
    Extension(kind): Extension<ItemKind>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ItemId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get_item(kind, id).await {
        Ok(item) => Json(dto::ItemView::from(&item)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
