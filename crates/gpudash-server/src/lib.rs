pub mod broadcast;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod services;
pub mod state;
pub mod ws;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use broadcast::BroadcastLoop;
pub use state::AppState;

/// Full application: API, socket, health check and the static dashboard as
/// fallback.
pub fn app(state: Arc<AppState>, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let api_routes = Router::new()
        .route("/system-info", get(handlers::system::system_info))
        .route("/gpu-info", get(handlers::system::gpu_info))
        .route("/gpu-benchmark", post(handlers::benchmark::gpu_benchmark))
        .route("/cpu-benchmark", post(handlers::benchmark::cpu_benchmark));

    let logged_routes = Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws::ws_handler))
        .layer(trace_layer);

    Router::new()
        .merge(logged_routes)
        .route("/health", get(handlers::health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .with_state(state)
}
