// Ingestion domain types
//
// Invocation is what the trigger layer hands us, EventRecord is what gets
// persisted, InvocationResponse is what goes back to the caller.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::error::IngestError;

/// One inbound request delivered by the trigger layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Raw request body. Meaningless when `is_base64_encoded` is set.
    pub body: Option<String>,
    pub is_base64_encoded: bool,
    /// Correlation id assigned by the runtime, never by the handler
    pub request_id: String,
}

impl Invocation {
    pub fn new(body: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            is_base64_encoded: false,
            request_id: request_id.into(),
        }
    }

    /// Invocation carrying a binary payload
    pub fn binary(request_id: impl Into<String>) -> Self {
        Self {
            body: None,
            is_base64_encoded: true,
            request_id: request_id.into(),
        }
    }
}

/// Validated, enriched event. Built once per accepted invocation and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub event_id: Uuid,
    /// Top-level `type` of the payload, kept as-is (not necessarily a string)
    #[serde(rename = "type")]
    pub event_type: Value,
    /// Unix seconds
    pub received_at: i64,
    pub payload: Map<String, Value>,
    pub request_id: String,
}

impl EventRecord {
    /// `type` rendered for log lines
    pub fn type_label(&self) -> String {
        match &self.event_type {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Handler result in the shape the trigger layer expects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    /// 200 on acceptance, 400 on rejection
    #[cfg_attr(feature = "openapi", schema(example = 200))]
    pub status_code: u16,
    /// JSON-encoded object, always with a `message` key
    pub body: String,
}

impl InvocationResponse {
    pub fn accepted(record: &EventRecord) -> Self {
        Self {
            status_code: 200,
            body: json!({
                "message": "event accepted",
                "event_id": record.event_id,
                "request_id": record.request_id,
            })
            .to_string(),
        }
    }

    /// Response for a client-side rejection
    pub fn rejected(error: &IngestError) -> Self {
        Self {
            status_code: error.status_code().unwrap_or(400),
            body: json!({ "message": error.client_message() }).to_string(),
        }
    }

    /// Parse the body back into JSON
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}
