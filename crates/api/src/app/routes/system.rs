use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};

use itemrelay_infra::Direction;

use crate::app::dto::BridgeHealthResponse;
use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Connection state of both bridge directions.
pub async fn bridge_health(
    Extension(services): Extension<Arc<AppServices>>,
) -> Json<BridgeHealthResponse> {
    Json(BridgeHealthResponse {
        publish: services.bridge_state(Direction::Publish).as_str(),
        consume: services.bridge_state(Direction::Consume).as_str(),
    })
}
