// Ingestion handler
//
// encoding guard -> JSON decode -> field validation -> enrichment -> persist
// -> log -> respond. Each check exits early; only a fully validated record is
// ever handed to the store.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{IngestError, StoreError};
use crate::event::{EventRecord, Invocation, InvocationResponse};
use crate::traits::{Clock, EventStore, IdGenerator, SystemClock, UuidV7Generator};

/// Field every payload must carry
pub const TYPE_FIELD: &str = "type";

/// Characters of a malformed body echoed into the log line
pub const BODY_PREVIEW_CHARS: usize = 100;

/// Validates, enriches and persists one invocation at a time
///
/// Holds no per-invocation state; the store handle is shared read-only across
/// concurrent calls.
#[derive(Clone)]
pub struct IngestionHandler {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl IngestionHandler {
    /// Handler using the wall clock and UUID v7 event ids
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self::with_sources(store, Arc::new(SystemClock), Arc::new(UuidV7Generator))
    }

    pub fn with_sources(
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    /// Process one invocation.
    ///
    /// Client errors come back as `Ok` with a 400 response. A failed store
    /// write is returned as `Err` and left for the runtime to surface.
    pub async fn handle(&self, invocation: Invocation) -> Result<InvocationResponse, StoreError> {
        match self.ingest(&invocation).await {
            Ok(record) => Ok(InvocationResponse::accepted(&record)),
            Err(IngestError::Store(err)) => Err(err),
            Err(rejection) => Ok(InvocationResponse::rejected(&rejection)),
        }
    }

    /// Run the pipeline and return the persisted record
    pub async fn ingest(&self, invocation: &Invocation) -> Result<EventRecord, IngestError> {
        let request_id = invocation.request_id.as_str();

        if invocation.is_base64_encoded {
            warn!(request_id, "Rejected base64 encoded payload");
            return Err(IngestError::UnsupportedEncoding);
        }

        let raw = invocation.body.as_deref().unwrap_or_default();

        let parsed = match decode_body(raw) {
            Ok(value) => value,
            Err(err) => {
                if let IngestError::MalformedPayload { preview } = &err {
                    warn!(request_id, body_preview = %preview, "Invalid JSON payload");
                }
                return Err(err);
            }
        };

        let (event_type, payload) = match validate(parsed) {
            Ok(valid) => valid,
            Err(err) => {
                if let IngestError::MissingField { present_keys, .. } = &err {
                    let payload_keys = Value::from(present_keys.clone());
                    warn!(request_id, payload_keys = %payload_keys, "Missing required field: type");
                }
                return Err(err);
            }
        };

        let record = EventRecord {
            event_id: self.ids.generate(),
            event_type,
            received_at: self.clock.now_unix_seconds(),
            payload,
            request_id: invocation.request_id.clone(),
        };

        self.store.put(&record).await?;

        info!(
            event_id = %record.event_id,
            event_type = %record.type_label(),
            request_id,
            "Event ingested"
        );

        Ok(record)
    }
}

/// Decode the raw body. An empty body stands for `{}`.
pub fn decode_body(raw: &str) -> Result<Value, IngestError> {
    if raw.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(|_| IngestError::MalformedPayload {
        preview: body_preview(raw),
    })
}

/// Require an object with a truthy `type`; returns the type and the payload.
///
/// Non-object JSON (arrays, scalars) has no keys and fails the same check.
pub fn validate(parsed: Value) -> Result<(Value, Map<String, Value>), IngestError> {
    let payload = match parsed {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    match payload.get(TYPE_FIELD) {
        Some(event_type) if is_truthy(event_type) => Ok((event_type.clone(), payload)),
        _ => Err(IngestError::MissingField {
            field: TYPE_FIELD,
            present_keys: payload.keys().cloned().collect(),
        }),
    }
}

/// Truthiness of a JSON value: null, false, zero and empty containers are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        // Out-of-range literals (e.g. 1e400) have no f64 form and are nonzero
        Value::Number(n) => !matches!(n.as_f64(), Some(f) if f == 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// First `BODY_PREVIEW_CHARS` characters of `raw`
pub fn body_preview(raw: &str) -> String {
    raw.chars().take(BODY_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailingEventStore, FixedClock, InMemoryEventStore, SequentialIdGenerator};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn handler_with(store: &InMemoryEventStore) -> IngestionHandler {
        IngestionHandler::new(Arc::new(store.clone()))
    }

    fn message(response: &InvocationResponse) -> String {
        response.body_json().unwrap()["message"]
            .as_str()
            .unwrap()
            .to_string()
    }

    // ------------------------------------------------------------------------
    // Example scenarios
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_signup_event_accepted() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);

        let response = handler
            .handle(Invocation::new(
                r#"{"type":"signup","email":"a@b.com"}"#,
                "req-1",
            ))
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        let body = response.body_json().unwrap();
        assert_eq!(body["message"], "event accepted");
        assert_eq!(body["request_id"], "req-1");

        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, json!("signup"));
        assert_eq!(
            Value::Object(records[0].payload.clone()),
            json!({"type": "signup", "email": "a@b.com"})
        );
        assert_eq!(body["event_id"], records[0].event_id.to_string());
    }

    #[tokio::test]
    async fn test_not_json_rejected() {
        let store = InMemoryEventStore::new();
        let response = handler_with(&store)
            .handle(Invocation::new("not json", "req-2"))
            .await
            .unwrap();

        assert_eq!(response.status_code, 400);
        assert_eq!(message(&response), "invalid JSON payload");
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_object_missing_type() {
        let store = InMemoryEventStore::new();
        let response = handler_with(&store)
            .handle(Invocation::new("{}", "req-3"))
            .await
            .unwrap();

        assert_eq!(response.status_code, 400);
        assert_eq!(message(&response), "missing required field: type");
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_base64_checked_before_decode() {
        let store = InMemoryEventStore::new();
        let invocation = Invocation {
            body: Some(r#"{"type":"x"}"#.to_string()),
            is_base64_encoded: true,
            request_id: "req-4".to_string(),
        };

        let response = handler_with(&store).handle(invocation).await.unwrap();

        assert_eq!(response.status_code, 400);
        assert_eq!(
            message(&response),
            "base64 encoded payloads are not supported"
        );
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_body_treated_as_empty_object() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);

        for body in [Some(String::new()), None] {
            let invocation = Invocation {
                body,
                is_base64_encoded: false,
                request_id: "req-5".to_string(),
            };
            let response = handler.handle(invocation).await.unwrap();

            assert_eq!(response.status_code, 400);
            assert_eq!(message(&response), "missing required field: type");
        }
        assert_eq!(store.write_count(), 0);
    }

    // ------------------------------------------------------------------------
    // Rejection properties
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_base64_rejected_regardless_of_body() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);

        for body in [None, Some(""), Some("not json"), Some(r#"{"type":"ok"}"#)] {
            let invocation = Invocation {
                body: body.map(str::to_string),
                is_base64_encoded: true,
                request_id: "req".to_string(),
            };
            let response = handler.handle(invocation).await.unwrap();
            assert_eq!(response.status_code, 400);
            assert_eq!(
                message(&response),
                "base64 encoded payloads are not supported"
            );
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_json_variants_rejected() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);

        for body in ["{", r#"{"type": }"#, "   ", "{'type': 'x'}", r#"{"type":"x"} trailing"#] {
            let response = handler.handle(Invocation::new(body, "req")).await.unwrap();
            assert_eq!(response.status_code, 400, "body: {body}");
            assert_eq!(message(&response), "invalid JSON payload");
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_falsy_type_rejected() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);

        for body in [
            r#"{"email":"a@b.com"}"#,
            r#"{"type":""}"#,
            r#"{"type":null}"#,
            r#"{"type":0}"#,
            r#"{"type":0.0}"#,
            r#"{"type":false}"#,
            r#"{"type":[]}"#,
            r#"{"type":{}}"#,
        ] {
            let response = handler.handle(Invocation::new(body, "req")).await.unwrap();
            assert_eq!(response.status_code, 400, "body: {body}");
            assert_eq!(message(&response), "missing required field: type");
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_non_object_json_rejected_as_missing_type() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);

        for body in ["[]", r#"[{"type":"x"}]"#, r#""signup""#, "42", "null", "true"] {
            let response = handler.handle(Invocation::new(body, "req")).await.unwrap();
            assert_eq!(response.status_code, 400, "body: {body}");
            assert_eq!(message(&response), "missing required field: type");
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_truthy_non_string_type_accepted() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);

        for (body, expected) in [
            (r#"{"type":7}"#, json!(7)),
            (r#"{"type":true}"#, json!(true)),
            (r#"{"type":{"name":"x"}}"#, json!({"name": "x"})),
        ] {
            let record = handler.ingest(&Invocation::new(body, "req")).await.unwrap();
            assert_eq!(record.event_type, expected);
        }
        assert_eq!(store.len().await, 3);
    }

    // ------------------------------------------------------------------------
    // Enrichment and persistence
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_record_fields_with_fixed_sources() {
        let store = InMemoryEventStore::new();
        let handler = IngestionHandler::with_sources(
            Arc::new(store.clone()),
            Arc::new(FixedClock::new(1_700_000_000)),
            Arc::new(SequentialIdGenerator::new()),
        );

        let record = handler
            .ingest(&Invocation::new(r#"{"type":"order","total":12.5}"#, "req-9"))
            .await
            .unwrap();

        assert_eq!(
            record,
            EventRecord {
                event_id: Uuid::from_u128(1),
                event_type: json!("order"),
                received_at: 1_700_000_000,
                payload: json!({"type": "order", "total": 12.5})
                    .as_object()
                    .cloned()
                    .unwrap(),
                request_id: "req-9".to_string(),
            }
        );
        assert_eq!(store.get(Uuid::from_u128(1)).await, Some(record));
    }

    #[tokio::test]
    async fn test_large_numbers_kept_exactly() {
        let store = InMemoryEventStore::new();
        let body = r#"{"type":"order","amount":123456789012345678901234567890,"precise":0.1000000000000000055511151231257827}"#;

        let record = handler_with(&store)
            .ingest(&Invocation::new(body, "req-big"))
            .await
            .unwrap();

        assert_eq!(
            record.payload["amount"].to_string(),
            "123456789012345678901234567890"
        );
        assert_eq!(
            record.payload["precise"].to_string(),
            "0.1000000000000000055511151231257827"
        );

        let stored = store.get(record.event_id).await.unwrap();
        assert_eq!(
            serde_json::to_string(&stored.payload).unwrap(),
            r#"{"amount":123456789012345678901234567890,"precise":0.1000000000000000055511151231257827,"type":"order"}"#
        );
    }

    #[tokio::test]
    async fn test_received_at_within_window() {
        let store = InMemoryEventStore::new();
        let before = Utc::now().timestamp();

        let record = handler_with(&store)
            .ingest(&Invocation::new(r#"{"type":"ping"}"#, "req"))
            .await
            .unwrap();

        let after = Utc::now().timestamp();
        assert!(before <= record.received_at && record.received_at <= after);
    }

    #[tokio::test]
    async fn test_payload_stored_verbatim() {
        let store = InMemoryEventStore::new();
        let body = json!({
            "type": "checkout",
            "items": [{"sku": "a", "qty": 2}, {"sku": "b", "qty": 1}],
            "meta": {"nested": {"deep": null}},
            "unicode": "héllo ✓"
        });

        let record = handler_with(&store)
            .ingest(&Invocation::new(body.to_string(), "req"))
            .await
            .unwrap();

        assert_eq!(Value::Object(record.payload), body);
    }

    #[tokio::test]
    async fn test_event_ids_unique_across_calls() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);
        let mut ids = HashSet::new();

        for _ in 0..50 {
            let response = handler
                .handle(Invocation::new(r#"{"type":"tick"}"#, "req"))
                .await
                .unwrap();
            let body = response.body_json().unwrap();
            ids.insert(body["event_id"].as_str().unwrap().to_string());
        }

        assert_eq!(ids.len(), 50);
        assert_eq!(store.len().await, 50);
    }

    #[tokio::test]
    async fn test_response_event_id_matches_persisted() {
        let store = InMemoryEventStore::new();
        let response = handler_with(&store)
            .handle(Invocation::new(r#"{"type":"signup"}"#, "req-7"))
            .await
            .unwrap();

        let event_id: Uuid = response.body_json().unwrap()["event_id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let stored = store.get(event_id).await.unwrap();
        assert_eq!(stored.request_id, "req-7");
    }

    #[tokio::test]
    async fn test_same_payload_twice_not_deduplicated() {
        let store = InMemoryEventStore::new();
        let handler = handler_with(&store);
        let invocation = Invocation::new(r#"{"type":"signup","email":"a@b.com"}"#, "req-1");

        let first = handler.ingest(&invocation).await.unwrap();
        let second = handler.ingest(&invocation).await.unwrap();

        assert_ne!(first.event_id, second.event_id);
        assert_eq!(first.event_type, second.event_type);
        assert_eq!(first.payload, second.payload);
        assert_eq!(first.request_id, second.request_id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let handler = IngestionHandler::new(Arc::new(FailingEventStore::new(
            StoreError::unavailable("connection refused"),
        )));

        let result = handler
            .handle(Invocation::new(r#"{"type":"signup"}"#, "req"))
            .await;

        assert_eq!(
            result,
            Err(StoreError::Unavailable("connection refused".to_string()))
        );
    }

    #[tokio::test]
    async fn test_rejections_never_touch_failing_store() {
        let handler = IngestionHandler::new(Arc::new(FailingEventStore::new(
            StoreError::unavailable("down"),
        )));

        let response = handler.handle(Invocation::new("{}", "req")).await.unwrap();
        assert_eq!(response.status_code, 400);
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    #[test]
    fn test_body_preview_truncates_to_chars() {
        let long = "x".repeat(250);
        assert_eq!(body_preview(&long).len(), BODY_PREVIEW_CHARS);

        let accented = "é".repeat(150);
        let preview = body_preview(&accented);
        assert_eq!(preview.chars().count(), BODY_PREVIEW_CHARS);
        assert_eq!(preview.len(), BODY_PREVIEW_CHARS * 2);

        assert_eq!(body_preview("short"), "short");
    }

    #[test]
    fn test_malformed_payload_carries_preview() {
        let raw = format!("<{}>", "a".repeat(200));
        match decode_body(&raw) {
            Err(IngestError::MalformedPayload { preview }) => {
                assert_eq!(preview, raw.chars().take(100).collect::<String>());
            }
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_lists_keys_only() {
        let err = validate(json!({"email": "secret@b.com", "name": "n"})).unwrap_err();
        match err {
            IngestError::MissingField {
                field,
                mut present_keys,
            } => {
                present_keys.sort();
                assert_eq!(field, "type");
                assert_eq!(present_keys, vec!["email", "name"]);
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(-0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!(-1)));
        assert!(is_truthy(&json!([0])));
        assert!(is_truthy(&json!({"a": null})));

        let parsed: Value = serde_json::from_str("[0e10, 0.000, 1e-5]").unwrap();
        assert!(!is_truthy(&parsed[0]));
        assert!(!is_truthy(&parsed[1]));
        assert!(is_truthy(&parsed[2]));
    }
}
