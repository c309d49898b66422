//! `itemrelay-core` — item store building blocks.
//!
//! This crate contains the item model and the store abstraction the CRUD gateway
//! mutates (no messaging concerns).

pub mod error;
pub mod id;
pub mod item;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use id::ItemId;
pub use item::ItemPayload;
pub use store::{InMemoryItemStore, ItemStore};
