// Intake API library
// Decision: Router assembly lives here so the binary and the HTTP tests share it
// Decision: The request id is assigned by middleware, never by the ingestion handler

pub mod config;
pub mod events;
pub mod health;
pub mod openapi;
pub mod telemetry;

use axum::Router;
use intake_core::{EventStore, IngestionHandler};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::openapi::ApiDoc;

/// Build the full application router
///
/// `/health` and the docs are never prefixed; `/v1/*` routes are nested under
/// `api_prefix` when it is set.
pub fn build_app(store: Arc<dyn EventStore>, store_backend: &str, api_prefix: &str) -> Router {
    let handler = Arc::new(IngestionHandler::new(store.clone()));
    build_app_with_handler(handler, store, store_backend, api_prefix)
}

/// Same as [`build_app`] with a preconfigured handler (custom clock or ids)
pub fn build_app_with_handler(
    handler: Arc<IngestionHandler>,
    store: Arc<dyn EventStore>,
    store_backend: &str,
    api_prefix: &str,
) -> Router {
    let api_routes = events::routes(events::AppState::new(handler));

    let health_state = health::HealthState {
        store,
        store_backend: store_backend.to_string(),
    };

    Router::new()
        .merge(health::routes(health_state))
        .merge(nest_api_routes(api_routes, api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// Mount the `/v1/*` routes under `api_prefix` (a normalized `/segment` or empty)
fn nest_api_routes(api_routes: Router, api_prefix: &str) -> Router {
    match api_prefix {
        "" => api_routes,
        prefix => Router::new().nest(prefix, api_routes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use intake_core::InMemoryEventStore;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn prefixed_app() -> Router {
        build_app(Arc::new(InMemoryEventStore::new()), "memory", "/api")
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_and_docs_ignore_prefix() {
        let app = prefixed_app();

        assert_eq!(get_status(app.clone(), "/health").await, StatusCode::OK);
        assert_eq!(
            get_status(app.clone(), "/api-doc/openapi.json").await,
            StatusCode::OK
        );
        assert_eq!(get_status(app, "/api/health").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_request_id_assigned_on_every_route() {
        let response = prefixed_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let request_id = response
            .headers()
            .get(events::REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(request_id.parse::<Uuid>().is_ok());
    }
}
