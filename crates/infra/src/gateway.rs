//! CRUD gateway: store mutation followed by event publication.
//!
//! This is the only component with request/response semantics. Every mutation runs
//! the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Build + encode the envelope (serialization failure => nothing changes)
//!   ↓
//! 2. Mutate the store (existence check and write under the store lock)
//!   ↓
//! 3. Hand the encoded bytes to the publisher (blocks through bus outages)
//! ```
//!
//! ## Error semantics
//!
//! - `AlreadyExists` / `NotFound` come from the store and leave it unchanged; no
//!   envelope is produced.
//! - `Serialization` is returned before the store is touched.
//! - Transport failures are absorbed by the publisher and never reach this layer.
//! - If the bridge shuts down while an event is pending, the mutation stands and the
//!   event is lost. The gateway logs it at error level and still answers success: store
//!   mutation and publish are not one atomic step.
//!
//! Reads never touch the bus.

use thiserror::Error;
use tracing::{debug, error};

use itemrelay_core::{ItemId, ItemPayload, ItemStore, StoreError};
use itemrelay_events::{EnvelopeError, EventEnvelope, EventKind};

use crate::publisher::{EventPublisher, PublishError};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client error from the item lifecycle (`AlreadyExists` / `NotFound`).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The envelope could not be encoded; the store was not mutated.
    #[error(transparent)]
    Serialization(#[from] EnvelopeError),
}

impl GatewayError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Store(StoreError::AlreadyExists(_)))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}

/// Orchestrates the item store and the event publisher.
///
/// Generic over the store and the publisher so tests can plug in recording fakes
/// and the binaries can use `Arc<dyn EventPublisher>`.
#[derive(Debug)]
pub struct CrudGateway<S, P> {
    store: S,
    publisher: P,
}

impl<S, P> CrudGateway<S, P> {
    pub fn new(store: S, publisher: P) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<S, P> CrudGateway<S, P>
where
    S: ItemStore,
    P: EventPublisher,
{
    /// `Absent -> Present`. Emits `item_created` with the stored value.
    pub fn create(&self, id: ItemId, item: ItemPayload) -> Result<ItemPayload, GatewayError> {
        let body = EventEnvelope::created(id.clone(), item.clone()).encode()?;
        self.store.insert_new(id.clone(), item.clone())?;
        self.emit(EventKind::ItemCreated, &id, &body);
        Ok(item)
    }

    /// Current value of `id`. No event.
    pub fn read(&self, id: &ItemId) -> Result<ItemPayload, GatewayError> {
        Ok(self.store.get(id)?)
    }

    /// `Present -> Present`. Emits `item_updated` with the new value.
    pub fn update(&self, id: ItemId, item: ItemPayload) -> Result<ItemPayload, GatewayError> {
        let body = EventEnvelope::updated(id.clone(), item.clone()).encode()?;
        self.store.replace(id.clone(), item.clone())?;
        self.emit(EventKind::ItemUpdated, &id, &body);
        Ok(item)
    }

    /// `Present -> Absent`. Emits `item_deleted` without a payload.
    pub fn delete(&self, id: &ItemId) -> Result<(), GatewayError> {
        let body = EventEnvelope::deleted(id.clone()).encode()?;
        self.store.remove(id)?;
        self.emit(EventKind::ItemDeleted, id, &body);
        Ok(())
    }

    fn emit(&self, event: EventKind, id: &ItemId, body: &[u8]) {
        match self.publisher.publish_encoded(body) {
            Ok(()) => debug!(%event, item_id = %id, "event published"),
            Err(PublishError::ShutDown) => {
                error!(%event, item_id = %id, "bridge shut down; event dropped after store mutation");
            }
            // Bytes were encoded up front, so the publisher has nothing left to serialize.
            Err(PublishError::Serialization(err)) => {
                error!(%event, item_id = %id, error = %err, "event dropped after store mutation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;
    use serde_json::json;

    use itemrelay_core::InMemoryItemStore;

    /// Records every published envelope; optionally reports shutdown instead.
    #[derive(Debug, Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<EventEnvelope>>,
        shut_down: bool,
    }

    impl RecordingPublisher {
        fn sent(&self) -> Vec<EventEnvelope> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish_encoded(&self, body: &[u8]) -> Result<(), PublishError> {
            if self.shut_down {
                return Err(PublishError::ShutDown);
            }
            self.sent
                .lock()
                .unwrap()
                .push(EventEnvelope::decode(body).expect("gateway publishes valid envelopes"));
            Ok(())
        }
    }

    type TestGateway = CrudGateway<InMemoryItemStore, Arc<RecordingPublisher>>;

    fn setup() -> (TestGateway, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        (
            CrudGateway::new(InMemoryItemStore::new(), publisher.clone()),
            publisher,
        )
    }

    fn payload(value: serde_json::Value) -> ItemPayload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn create_stores_and_emits_item_created() {
        let (gateway, publisher) = setup();
        let item = payload(json!({"name": "widget", "qty": 3}));

        let stored = gateway.create(ItemId::new("a"), item.clone()).unwrap();

        assert_eq!(stored, item);
        assert_eq!(gateway.read(&ItemId::new("a")).unwrap(), item);
        assert_eq!(publisher.sent(), vec![EventEnvelope::created("a", item)]);
    }

    #[test]
    fn create_existing_fails_and_leaves_store_unchanged() {
        let (gateway, publisher) = setup();
        let original = payload(json!({"v": 1}));
        gateway.create(ItemId::new("a"), original.clone()).unwrap();

        let err = gateway
            .create(ItemId::new("a"), payload(json!({"v": 2})))
            .unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(gateway.read(&ItemId::new("a")).unwrap(), original);
        assert_eq!(publisher.sent().len(), 1);
    }

    #[test]
    fn missing_id_fails_with_not_found_and_no_envelope() {
        let (gateway, publisher) = setup();
        let id = ItemId::new("ghost");

        assert!(gateway.read(&id).unwrap_err().is_not_found());
        assert!(gateway.update(id.clone(), payload(json!({}))).unwrap_err().is_not_found());
        assert!(gateway.delete(&id).unwrap_err().is_not_found());
        assert!(publisher.sent().is_empty());
    }

    #[test]
    fn update_replaces_value_and_emits_item_updated() {
        let (gateway, publisher) = setup();
        gateway.create(ItemId::new("a"), payload(json!({"v": 1}))).unwrap();
        let next = payload(json!({"v": 2}));

        gateway.update(ItemId::new("a"), next.clone()).unwrap();

        assert_eq!(gateway.read(&ItemId::new("a")).unwrap(), next);
        assert_eq!(publisher.sent()[1], EventEnvelope::updated("a", next));
    }

    #[test]
    fn create_duplicate_delete_scenario() {
        let (gateway, publisher) = setup();
        let item = payload(json!({"name": "x"}));

        gateway.create(ItemId::new("a"), item.clone()).unwrap();
        assert_eq!(publisher.sent().len(), 1);

        assert!(gateway.create(ItemId::new("a"), item).unwrap_err().is_already_exists());
        assert_eq!(publisher.sent().len(), 1);

        gateway.delete(&ItemId::new("a")).unwrap();
        let sent = publisher.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].kind(), EventKind::ItemDeleted);
        assert!(sent[1].item().is_none());
        assert!(gateway.store().is_empty());
    }

    #[test]
    fn shutdown_during_publish_keeps_mutation_and_reports_success() {
        let publisher = Arc::new(RecordingPublisher {
            shut_down: true,
            ..RecordingPublisher::default()
        });
        let gateway = CrudGateway::new(InMemoryItemStore::new(), publisher.clone());

        gateway.create(ItemId::new("a"), payload(json!({}))).unwrap();

        assert_eq!(gateway.store().len(), 1);
        assert!(publisher.sent().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(String, i64),
        Read(String),
        Update(String, i64),
        Delete(String),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        let id = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string);
        prop_oneof![
            (id.clone(), any::<i64>()).prop_map(|(id, v)| Op::Create(id, v)),
            id.clone().prop_map(Op::Read),
            (id.clone(), any::<i64>()).prop_map(|(id, v)| Op::Update(id, v)),
            id.prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

        #[test]
        fn replay_matches_model_and_emits_one_envelope_per_mutation(
            ops in prop::collection::vec(arb_op(), 0..40)
        ) {
            let (gateway, publisher) = setup();
            let mut model: HashMap<String, ItemPayload> = HashMap::new();
            let mut expected: Vec<EventEnvelope> = Vec::new();

            for op in ops {
                match op {
                    Op::Create(id, v) => {
                        let item = payload(json!({ "v": v }));
                        let res = gateway.create(ItemId::new(id.clone()), item.clone());
                        if model.contains_key(&id) {
                            prop_assert!(res.unwrap_err().is_already_exists());
                        } else {
                            prop_assert!(res.is_ok());
                            expected.push(EventEnvelope::created(id.clone(), item.clone()));
                            model.insert(id, item);
                        }
                    }
                    Op::Read(id) => {
                        let res = gateway.read(&ItemId::new(id.clone()));
                        match model.get(&id) {
                            Some(item) => prop_assert_eq!(&res.unwrap(), item),
                            None => prop_assert!(res.unwrap_err().is_not_found()),
                        }
                    }
                    Op::Update(id, v) => {
                        let item = payload(json!({ "v": v }));
                        let res = gateway.update(ItemId::new(id.clone()), item.clone());
                        if model.contains_key(&id) {
                            prop_assert!(res.is_ok());
                            expected.push(EventEnvelope::updated(id.clone(), item.clone()));
                            model.insert(id, item);
                        } else {
                            prop_assert!(res.unwrap_err().is_not_found());
                        }
                    }
                    Op::Delete(id) => {
                        let res = gateway.delete(&ItemId::new(id.clone()));
                        if model.remove(&id).is_some() {
                            prop_assert!(res.is_ok());
                            expected.push(EventEnvelope::deleted(id));
                        } else {
                            prop_assert!(res.unwrap_err().is_not_found());
                        }
                    }
                }
            }

            let snapshot: HashMap<String, ItemPayload> = gateway
                .store()
                .snapshot()
                .into_iter()
                .map(|(id, item)| (id.into_inner(), item))
                .collect();
            prop_assert_eq!(snapshot, model);
            prop_assert_eq!(publisher.sent(), expected);
        }
    }
}
