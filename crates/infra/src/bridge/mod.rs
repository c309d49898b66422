//! Bridge connection manager: two independent, self-healing channels to the bus.
//!
//! ```text
//!            ┌──────────── publish direction ────────────┐
//! Publisher ─┤ ensure_publish_channel() ⟲ fixed delay     ├─▶ broker
//!            └───────────────────────────────────────────┘
//!            ┌──────────── consume direction ────────────┐
//! Consumer  ─┤ ensure_consume_channel() ⟲ fixed delay     ├─◀ broker
//!            └───────────────────────────────────────────┘
//! ```
//!
//! Each direction has its own state cell and its own connect cycle; nothing one
//! direction does can block or reset the other. The only shared piece is the shutdown
//! signal, which ends both.

mod manager;
mod state;

pub use manager::{BridgeError, BridgeManager, RetryPolicy};
pub use state::{ChannelState, Direction};
