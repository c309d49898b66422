use serde::{Deserialize, Serialize};

use itemrelay_core::ItemPayload;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub item_id: String,
    pub item: ItemPayload,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub message: &'static str,
    pub item: ItemPayload,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct BridgeHealthResponse {
    pub publish: &'static str,
    pub consume: &'static str,
}
