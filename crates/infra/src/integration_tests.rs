//! Integration tests for the full relay pipeline.
//!
//! Tests: Gateway → Publisher → Broker → ConsumerLoop → Persister → Sink
//!
//! Verifies:
//! - Every successful mutation reaches the sink exactly once, in order
//! - Rejected requests publish nothing
//! - Broker outages and severed channels delay events but never drop them

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use serde_json::json;

    use itemrelay_core::{InMemoryItemStore, ItemId, ItemPayload};
    use itemrelay_events::{BusBinding, EventEnvelope, EventKind, InMemoryBroker};

    use crate::bridge::{BridgeManager, ChannelState, Direction, RetryPolicy};
    use crate::consumer::{ConsumerHandle, ConsumerLoop};
    use crate::gateway::CrudGateway;
    use crate::persister::{InMemoryEventSink, Persister};
    use crate::publisher::Publisher;

    type Gateway = CrudGateway<Arc<InMemoryItemStore>, Arc<Publisher<InMemoryBroker>>>;

    struct Pipeline {
        broker: InMemoryBroker,
        bridge: Arc<BridgeManager<InMemoryBroker>>,
        gateway: Gateway,
        sink: Arc<InMemoryEventSink>,
        consumer: ConsumerHandle,
    }

    fn setup() -> Pipeline {
        let broker = InMemoryBroker::new();
        let bridge = Arc::new(BridgeManager::new(
            broker.clone(),
            BusBinding::new("items", "item_events", "item"),
            RetryPolicy::fixed(Duration::from_millis(10)),
        ));

        let publisher = Arc::new(Publisher::new(bridge.clone()));
        let gateway = CrudGateway::new(Arc::new(InMemoryItemStore::new()), publisher);

        let sink = Arc::new(InMemoryEventSink::new());
        let persister = Persister::new(sink.clone());
        let consumer = ConsumerLoop::new(bridge.clone())
            .with_poll_interval(Duration::from_millis(10))
            .spawn("persister-test", move |raw: &[u8]| persister.handle(raw))
            .unwrap();

        Pipeline {
            broker,
            bridge,
            gateway,
            sink,
            consumer,
        }
    }

    fn item(value: serde_json::Value) -> ItemPayload {
        value.as_object().cloned().unwrap()
    }

    fn wait_for_records(sink: &InMemoryEventSink, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.len() < n {
            assert!(
                Instant::now() < deadline,
                "expected {n} persisted events, got {}",
                sink.len()
            );
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn persisted(sink: &InMemoryEventSink) -> Vec<EventEnvelope> {
        sink.records()
            .iter()
            .map(|r| EventEnvelope::decode(r.message.as_bytes()).unwrap())
            .collect()
    }

    #[test]
    fn create_duplicate_delete_reaches_the_sink_once_each() {
        let p = setup();
        let widget = item(json!({"name": "widget"}));

        p.gateway.create(ItemId::new("a"), widget.clone()).unwrap();
        assert!(p.gateway.create(ItemId::new("a"), widget.clone()).is_err());
        p.gateway.delete(&ItemId::new("a")).unwrap();

        wait_for_records(&p.sink, 2);
        thread::sleep(Duration::from_millis(30));

        let records = p.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, EventKind::ItemCreated);
        assert_eq!(records[1].event, EventKind::ItemDeleted);
        assert_eq!(
            persisted(&p.sink),
            vec![EventEnvelope::created("a", widget), EventEnvelope::deleted("a")]
        );
        p.consumer.shutdown();
    }

    #[test]
    fn sequential_mutations_arrive_in_call_order() {
        let p = setup();
        for v in 0..10 {
            let id = ItemId::new(format!("k{v}"));
            p.gateway.create(id.clone(), item(json!({"v": v}))).unwrap();
            p.gateway.update(id, item(json!({"v": v + 1}))).unwrap();
        }

        wait_for_records(&p.sink, 20);
        let kinds: Vec<EventKind> = p.sink.records().iter().map(|r| r.event).collect();
        let expected: Vec<EventKind> = (0..10)
            .flat_map(|_| [EventKind::ItemCreated, EventKind::ItemUpdated])
            .collect();
        assert_eq!(kinds, expected);
        p.consumer.shutdown();
    }

    #[test]
    fn publish_during_outage_is_delivered_after_recovery() {
        let p = setup();
        p.gateway.create(ItemId::new("before"), item(json!({}))).unwrap();
        wait_for_records(&p.sink, 1);

        p.broker.set_available(false);
        let gateway = Arc::new(p.gateway);
        let pending = {
            let gateway = gateway.clone();
            thread::spawn(move || gateway.create(ItemId::new("during"), item(json!({}))))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pending.is_finished());
        assert_ne!(p.bridge.state(Direction::Publish), ChannelState::Connected);

        p.broker.set_available(true);
        pending.join().unwrap().unwrap();

        wait_for_records(&p.sink, 2);
        let ids: Vec<String> = persisted(&p.sink)
            .iter()
            .map(|e| e.item_id().to_string())
            .collect();
        assert_eq!(ids, vec!["before", "during"]);
        p.consumer.shutdown();
    }

    #[test]
    fn severed_channels_recover_without_losing_events() {
        let p = setup();
        p.gateway.create(ItemId::new("one"), item(json!({}))).unwrap();
        wait_for_records(&p.sink, 1);

        p.broker.sever_connections();
        p.gateway.create(ItemId::new("two"), item(json!({}))).unwrap();
        p.gateway.create(ItemId::new("three"), item(json!({}))).unwrap();

        wait_for_records(&p.sink, 3);
        assert!(p.bridge.connect_count(Direction::Publish) >= 2);
        assert!(p.bridge.connect_count(Direction::Consume) >= 2);
        p.consumer.shutdown();
    }

    #[test]
    fn malformed_message_does_not_block_later_events() {
        let p = setup();
        {
            use itemrelay_events::{BusChannel, Connector, PublishChannel};
            let mut raw = p.broker.connect_publish().unwrap();
            raw.declare(p.bridge.binding()).unwrap();
            raw.publish(p.bridge.binding(), b"not json").unwrap();
        }

        p.gateway.create(ItemId::new("ok"), item(json!({}))).unwrap();

        wait_for_records(&p.sink, 1);
        assert_eq!(persisted(&p.sink), vec![EventEnvelope::created("ok", item(json!({})))]);
        p.consumer.shutdown();
    }

    #[test]
    fn consumers_on_separate_queues_each_see_every_event() {
        let p = setup();

        let audit_bridge = Arc::new(BridgeManager::new(
            p.broker.clone(),
            BusBinding::new("items", "item_events.audit", "item"),
            RetryPolicy::fixed(Duration::from_millis(10)),
        ));
        let audit_sink = Arc::new(InMemoryEventSink::new());
        let audit_persister = Persister::new(audit_sink.clone());
        let audit = ConsumerLoop::new(audit_bridge.clone())
            .with_poll_interval(Duration::from_millis(10))
            .spawn("audit-test", move |raw: &[u8]| audit_persister.handle(raw))
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !p.broker.is_declared(audit_bridge.binding()) {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }

        for id in ["a", "b", "c"] {
            p.gateway.create(ItemId::new(id), item(json!({}))).unwrap();
        }
        p.gateway.delete(&ItemId::new("b")).unwrap();

        wait_for_records(&p.sink, 4);
        wait_for_records(&audit_sink, 4);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(persisted(&p.sink), persisted(&audit_sink));
        assert_eq!(p.sink.len(), 4);

        audit.shutdown();
        p.consumer.shutdown();
    }

    #[test]
    fn shutdown_closes_consume_channel_and_joins_thread() {
        let p = setup();
        let deadline = Instant::now() + Duration::from_secs(5);
        while p.bridge.state(Direction::Consume) != ChannelState::Connected {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }

        p.consumer.shutdown();

        assert_eq!(p.bridge.state(Direction::Consume), ChannelState::Disconnected);
        assert!(p.bridge.is_shutting_down());
    }
}
