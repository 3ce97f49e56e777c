// OpenAPI specification for the Intake API

use crate::{events, health};
use intake_core::InvocationResponse;
use utoipa::OpenApi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        events::ingest_event,
        events::invoke,
        health::health,
    ),
    components(
        schemas(
            events::InvocationEnvelope,
            events::RequestContext,
            events::EventAccepted,
            events::EventRejected,
            health::HealthResponse,
            InvocationResponse,
        )
    ),
    tags(
        (name = "events", description = "Event ingestion endpoints"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "Intake API",
        version = "0.1.0",
        description = "HTTP endpoint that validates application events and records them in a durable store",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;
