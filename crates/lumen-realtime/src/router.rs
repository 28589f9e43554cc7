//! Main application router.

use crate::{
    controllers::{health_controller, jobs_controller, ws_controller},
    middleware::{logging_middleware, REQUEST_ID_HEADER},
    state::AppState,
};
use axum::{http::HeaderName, middleware, routing::get, Router};
use lumen_config::{RealtimeConfig, ServerConfig};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Creates the application router: health checks, the job API under
/// `/api/v1`, and the realtime upgrade endpoint.
pub fn create_router(state: AppState, server: &ServerConfig, realtime: &RealtimeConfig) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let router = Router::new()
        .merge(health_controller::router())
        .nest("/api/v1", jobs_controller::router())
        .merge(ws_controller::router(&realtime.path))
        .route("/", get(root))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware))
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(create_cors_layer(server));

    info!(realtime_path = %realtime.path, "Router created");
    router
}

/// Creates a CORS layer based on server configuration.
fn create_cors_layer(server: &ServerConfig) -> CorsLayer {
    if !server.cors_enabled {
        return CorsLayer::new();
    }
    if server.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins = server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect::<Vec<_>>();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> &'static str {
    "Lumen realtime gateway"
}
