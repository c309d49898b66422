use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use itemrelay_core::{ItemId, ItemPayload};
use itemrelay_infra::GatewayError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateItemRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    if body.item_id.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_item_id",
            "item_id must not be empty",
        );
    }

    let id = ItemId::new(body.item_id);
    match run_gateway(services, move |s| s.gateway().create(id, body.item)).await {
        Ok(item) => (
            StatusCode::CREATED,
            Json(dto::ItemResponse {
                message: "Item created",
                item,
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    match services.gateway().read(&ItemId::new(id)) {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => errors::gateway_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<ItemPayload>, JsonRejection>,
) -> Response {
    let Json(item) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    let id = ItemId::new(id);
    match run_gateway(services, move |s| s.gateway().update(id, item)).await {
        Ok(item) => (
            StatusCode::OK,
            Json(dto::ItemResponse {
                message: "Item updated",
                item,
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = ItemId::new(id);
    match run_gateway(services, move |s| s.gateway().delete(&id)).await {
        Ok(()) => (
            StatusCode::OK,
            Json(dto::MessageResponse {
                message: "Item deleted",
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// Run a mutating gateway call on the blocking pool; publishing may wait out a
/// broker outage.
async fn run_gateway<T, F>(services: Arc<AppServices>, op: F) -> Result<T, Response>
where
    F: FnOnce(&AppServices) -> Result<T, GatewayError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(&services)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(errors::gateway_error_to_response(e)),
        Err(join_err) => {
            error!(error = %join_err, "gateway task failed");
            Err(errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            ))
        }
    }
}
