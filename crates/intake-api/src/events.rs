// Event ingestion HTTP routes
//
// Two ways in:
// - POST /v1/events takes the event JSON as the raw request body
// - POST /v1/invocations takes a proxy-style envelope and answers with one
//
// Both build an Invocation and hand it to the IngestionHandler. A failed
// store write is not turned into a JSON body; the caller gets a bare 500.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use intake_core::{IngestionHandler, Invocation, InvocationResponse, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Header carrying the request id (set by SetRequestIdLayer when absent)
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ============================================
// App State and Routes
// ============================================

/// App state for event routes
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<IngestionHandler>,
}

impl AppState {
    pub fn new(handler: Arc<IngestionHandler>) -> Self {
        Self { handler }
    }
}

/// Create event routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/events", post(ingest_event))
        .route("/v1/invocations", post(invoke))
        .with_state(state)
}

// ============================================
// Request / Response types
// ============================================

/// Proxy-style invocation envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEnvelope {
    /// Raw event body (JSON text)
    #[serde(default)]
    #[schema(example = r#"{"type":"signup","email":"a@b.com"}"#)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
}

/// Invocation metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: Option<String>,
}

/// Body of an accepted event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventAccepted {
    #[schema(example = "event accepted")]
    pub message: String,
    pub event_id: uuid::Uuid,
    pub request_id: String,
}

/// Body of a rejected event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventRejected {
    #[schema(example = "missing required field: type")]
    pub message: String,
}

// ============================================
// HTTP Handlers
// ============================================

/// POST /v1/events - Ingest one event
#[utoipa::path(
    post,
    path = "/v1/events",
    request_body(content = String, content_type = "application/json", description = "Event JSON with a required `type` field"),
    responses(
        (status = 200, description = "Event accepted", body = EventAccepted),
        (status = 400, description = "Binary payload, invalid JSON or missing type", body = EventRejected),
        (status = 500, description = "Event could not be persisted")
    ),
    tag = "events"
)]
pub async fn ingest_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, StatusCode> {
    let request_id = request_id_from(&headers).unwrap_or_default();

    let invocation = if body.is_empty() {
        Invocation {
            body: None,
            is_base64_encoded: false,
            request_id,
        }
    } else {
        match String::from_utf8(body.to_vec()) {
            Ok(text) => Invocation {
                body: Some(text),
                is_base64_encoded: false,
                request_id,
            },
            // Binary bodies are what a gateway would base64-encode
            Err(_) => Invocation::binary(request_id),
        }
    };

    let response = run(&state.handler, invocation).await?;
    into_http_response(response)
}

/// POST /v1/invocations - Run the handler on an invocation envelope
///
/// The HTTP status is always 200 when the handler completes; the invocation's
/// own status is in `statusCode`.
#[utoipa::path(
    post,
    path = "/v1/invocations",
    request_body = InvocationEnvelope,
    responses(
        (status = 200, description = "Handler completed", body = InvocationResponse),
        (status = 500, description = "Event could not be persisted")
    ),
    tag = "events"
)]
pub async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(envelope): Json<InvocationEnvelope>,
) -> Result<Json<InvocationResponse>, StatusCode> {
    let request_id = envelope
        .request_context
        .and_then(|ctx| ctx.request_id)
        .filter(|id| !id.is_empty())
        .or_else(|| request_id_from(&headers))
        .unwrap_or_default();

    let invocation = Invocation {
        body: envelope.body,
        is_base64_encoded: envelope.is_base64_encoded,
        request_id,
    };

    Ok(Json(run(&state.handler, invocation).await?))
}

async fn run(
    handler: &IngestionHandler,
    invocation: Invocation,
) -> Result<InvocationResponse, StatusCode> {
    let request_id = invocation.request_id.clone();
    handler.handle(invocation).await.map_err(|e: StoreError| {
        tracing::error!(request_id = %request_id, error = %e, "Failed to persist event");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn request_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn into_http_response(response: InvocationResponse) -> Result<Response, StatusCode> {
    let status =
        StatusCode::from_u16(response.status_code).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        response.body,
    )
        .into_response())
}
