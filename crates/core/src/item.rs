//! Item payloads.

/// Arbitrary structured item value: a JSON object.
///
/// `serde_json` is built without `preserve_order`, so keys serialize in sorted order
/// and two equal payloads always encode to the same bytes.
pub type ItemPayload = serde_json::Map<String, serde_json::Value>;
