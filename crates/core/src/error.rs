//! Store error model.

use thiserror::Error;

use crate::ItemId;

/// Result type used by item stores.
pub type StoreResult<T> = Result<T, StoreError>;

/// Client-input failures of the item lifecycle.
///
/// These are deterministic: retrying the same call against the same store state
/// always fails the same way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `create` was called for an id that is already present.
    #[error("item already exists: {0}")]
    AlreadyExists(ItemId),

    /// `read`/`update`/`delete` was called for an id that is absent.
    #[error("item not found: {0}")]
    NotFound(ItemId),
}

impl StoreError {
    pub fn already_exists(id: impl Into<ItemId>) -> Self {
        Self::AlreadyExists(id.into())
    }

    pub fn not_found(id: impl Into<ItemId>) -> Self {
        Self::NotFound(id.into())
    }

    /// The id the failed operation targeted.
    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::AlreadyExists(id) | Self::NotFound(id) => id,
        }
    }
}
