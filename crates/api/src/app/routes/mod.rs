use axum::{
    routing::{get, post},
    Router,
};

pub mod items;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/health/bridge", get(system::bridge_health))
        .route("/items", post(items::create_item))
        .route(
            "/items/:id",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
}
