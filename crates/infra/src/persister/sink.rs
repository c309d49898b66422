use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use itemrelay_events::EventKind;

/// One row of event history.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEvent {
    pub event: EventKind,
    /// Raw envelope text as delivered.
    pub message: String,
    pub received_at: DateTime<Utc>,
}

impl PersistedEvent {
    pub fn new(event: EventKind, message: impl Into<String>) -> Self {
        Self {
            event,
            message: message.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("insert failed: {0}")]
    Insert(String),
}

/// Durable destination for persisted events.
pub trait EventSink: Send + Sync {
    fn insert(&self, event: &PersistedEvent) -> Result<(), SinkError>;
}

impl<S> EventSink for Arc<S>
where
    S: EventSink + ?Sized,
{
    fn insert(&self, event: &PersistedEvent) -> Result<(), SinkError> {
        (**self).insert(event)
    }
}

/// Sink that keeps every record in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    records: Mutex<Vec<PersistedEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PersistedEvent> {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for InMemoryEventSink {
    fn insert(&self, event: &PersistedEvent) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Sink that only logs each record. Used when no database is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn insert(&self, event: &PersistedEvent) -> Result<(), SinkError> {
        info!(
            event = %event.event,
            received_at = %event.received_at,
            message = %event.message,
            "event recorded"
        );
        Ok(())
    }
}
