use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use itemrelay_core::StoreError;
use itemrelay_infra::GatewayError;

pub fn gateway_error_to_response(err: GatewayError) -> axum::response::Response {
    match err {
        GatewayError::Store(StoreError::AlreadyExists(_)) => {
            json_error(StatusCode::BAD_REQUEST, "already_exists", "Item already exists")
        }
        GatewayError::Store(StoreError::NotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "Item not found")
        }
        GatewayError::Serialization(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "serialization_error",
            e.to_string(),
        ),
    }
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
