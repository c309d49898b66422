use serde::{Deserialize, Serialize};
use thiserror::Error;

use itemrelay_core::{ItemId, ItemPayload};

/// The kind of mutation an envelope records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ItemCreated,
    ItemUpdated,
    ItemDeleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ItemCreated => "item_created",
            EventKind::ItemUpdated => "item_updated",
            EventKind::ItemDeleted => "item_deleted",
        }
    }

    /// Whether envelopes of this kind carry an `item` payload.
    pub fn carries_item(&self) -> bool {
        !matches!(self, EventKind::ItemDeleted)
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Envelope for one item mutation, as carried over the bus.
///
/// Wire format (JSON, fields in this order):
///
/// ```text
/// { "event": "item_created" | "item_updated" | "item_deleted",
///   "item_id": string,
///   "item": object }        // omitted for item_deleted
/// ```
///
/// Notes:
/// - **Immutable**: fields are private and set only by the kind-specific constructors.
/// - **Deterministic**: the same fields always encode to the same bytes.
/// - Decoding rejects an `item` on `item_deleted` and a missing `item` on the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope")]
pub struct EventEnvelope {
    event: EventKind,
    item_id: ItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<ItemPayload>,
}

impl EventEnvelope {
    pub fn created(item_id: impl Into<ItemId>, item: ItemPayload) -> Self {
        Self {
            event: EventKind::ItemCreated,
            item_id: item_id.into(),
            item: Some(item),
        }
    }

    pub fn updated(item_id: impl Into<ItemId>, item: ItemPayload) -> Self {
        Self {
            event: EventKind::ItemUpdated,
            item_id: item_id.into(),
            item: Some(item),
        }
    }

    pub fn deleted(item_id: impl Into<ItemId>) -> Self {
        Self {
            event: EventKind::ItemDeleted,
            item_id: item_id.into(),
            item: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn item(&self) -> Option<&ItemPayload> {
        self.item.as_ref()
    }

    /// Encode to the JSON wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::Encode)
    }

    /// Decode from JSON wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::Decode)
    }
}

#[derive(Deserialize)]
struct WireEnvelope {
    event: EventKind,
    item_id: ItemId,
    #[serde(default)]
    item: Option<ItemPayload>,
}

impl TryFrom<WireEnvelope> for EventEnvelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        match (wire.event.carries_item(), wire.item) {
            (true, Some(item)) => Ok(Self {
                event: wire.event,
                item_id: wire.item_id,
                item: Some(item),
            }),
            (false, None) => Ok(Self::deleted(wire.item_id)),
            (true, None) => Err(format!("{} envelope is missing `item`", wire.event)),
            (false, Some(_)) => Err(format!("{} envelope must not carry `item`", wire.event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> ItemPayload {
        match value {
            serde_json::Value::Object(m) => m,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn created_envelope_has_fixed_wire_shape() {
        let env = EventEnvelope::created("a", payload(json!({"x": 1})));
        let text = String::from_utf8(env.encode().unwrap()).unwrap();
        assert_eq!(text, r#"{"event":"item_created","item_id":"a","item":{"x":1}}"#);
    }

    #[test]
    fn deleted_envelope_omits_item_field() {
        let env = EventEnvelope::deleted("a");
        let text = String::from_utf8(env.encode().unwrap()).unwrap();
        assert_eq!(text, r#"{"event":"item_deleted","item_id":"a"}"#);
    }

    #[test]
    fn encoding_is_deterministic_regardless_of_insertion_order() {
        let mut first = ItemPayload::new();
        first.insert("b".into(), json!(2));
        first.insert("a".into(), json!(1));
        let mut second = ItemPayload::new();
        second.insert("a".into(), json!(1));
        second.insert("b".into(), json!(2));

        let a = EventEnvelope::updated("k", first).encode().unwrap();
        let b = EventEnvelope::updated("k", second).encode().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn decode_rejects_kind_payload_mismatch() {
        let missing = br#"{"event":"item_updated","item_id":"a"}"#;
        assert!(matches!(
            EventEnvelope::decode(missing),
            Err(EnvelopeError::Decode(_))
        ));

        let extra = br#"{"event":"item_deleted","item_id":"a","item":{}}"#;
        assert!(EventEnvelope::decode(extra).is_err());
    }

    #[test]
    fn large_floats_survive_decode_unchanged() {
        let env = EventEnvelope::updated("a", payload(json!({"x": 7.601852688166678e274})));
        let decoded = EventEnvelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded, env);
        assert_eq!(decoded.item().unwrap()["x"].as_f64(), Some(7.601852688166678e274));
    }

    #[test]
    fn decode_rejects_unknown_kind_and_garbage() {
        assert!(EventEnvelope::decode(br#"{"event":"item_moved","item_id":"a"}"#).is_err());
        assert!(EventEnvelope::decode(b"not json").is_err());
    }

    fn arb_value() -> impl Strategy<Value = serde_json::Value> {
        use serde_json::Value;

        let finite = prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO;
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            finite.prop_map(Value::from),
            ".{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_payload() -> impl Strategy<Value = ItemPayload> {
        prop::collection::btree_map("[a-z]{1,8}", arb_value(), 0..6)
            .prop_map(|m| m.into_iter().collect())
    }

    fn arb_envelope() -> impl Strategy<Value = EventEnvelope> {
        let id = "[a-zA-Z0-9_-]{1,16}";
        prop_oneof![
            (id, arb_payload()).prop_map(|(id, p)| EventEnvelope::created(id, p)),
            (id, arb_payload()).prop_map(|(id, p)| EventEnvelope::updated(id, p)),
            id.prop_map(|id| EventEnvelope::deleted(id)),
        ]
    }

    proptest! {
        /// Property: decoding an encoded envelope yields the original, for every kind.
        #[test]
        fn decode_inverts_encode(env in arb_envelope()) {
            let bytes = env.encode().unwrap();
            prop_assert_eq!(EventEnvelope::decode(&bytes).unwrap(), env);
        }
    }
}
