//! Persister: the consumer handler that records every delivered envelope.
//!
//! Each delivery is decoded to learn its event kind, then inserted into a sink as
//! `{event, message}` where `message` is the raw envelope text. Failures (undecodable
//! bytes, sink errors) are returned to the consumer loop, which logs them and moves
//! on; nothing is retried.

mod sink;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use sink::{EventSink, InMemoryEventSink, LogEventSink, PersistedEvent, SinkError};

use thiserror::Error;
use tracing::debug;

use itemrelay_events::{EnvelopeError, EventEnvelope};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("message is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Decode(#[from] EnvelopeError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone)]
pub struct Persister<S> {
    sink: S,
}

impl<S> Persister<S>
where
    S: EventSink,
{
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Decode one delivered message and insert it into the sink.
    pub fn handle(&self, raw: &[u8]) -> Result<(), PersistError> {
        let message = std::str::from_utf8(raw)?;
        let envelope = EventEnvelope::decode(raw)?;

        let record = PersistedEvent::new(envelope.kind(), message);
        self.sink.insert(&record)?;

        debug!(event = %envelope.kind(), item_id = %envelope.item_id(), "event persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use itemrelay_events::EventKind;

    #[derive(Debug)]
    struct FailingSink;

    impl EventSink for FailingSink {
        fn insert(&self, _event: &PersistedEvent) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("disk full".into()))
        }
    }

    #[test]
    fn stores_kind_and_raw_message_text() {
        let persister = Persister::new(InMemoryEventSink::new());
        let item = json!({"name": "widget"}).as_object().cloned().unwrap();
        let raw = EventEnvelope::created("a", item).encode().unwrap();

        persister.handle(&raw).unwrap();

        let records = persister.sink().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, EventKind::ItemCreated);
        assert_eq!(records[0].message.as_bytes(), raw.as_slice());
    }

    #[test]
    fn rejects_malformed_messages_without_inserting() {
        let persister = Persister::new(InMemoryEventSink::new());

        assert!(matches!(
            persister.handle(&[0xff, 0xfe]),
            Err(PersistError::NotUtf8(_))
        ));
        assert!(matches!(
            persister.handle(br#"{"event":"item_exploded","item_id":"a"}"#),
            Err(PersistError::Decode(_))
        ));
        assert!(persister.sink().is_empty());
    }

    #[test]
    fn sink_failures_are_reported() {
        let persister = Persister::new(FailingSink);
        let raw = EventEnvelope::deleted("a").encode().unwrap();
        assert!(matches!(persister.handle(&raw), Err(PersistError::Sink(_))));
    }
}
