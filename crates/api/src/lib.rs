//! HTTP API server for the dance class booking system.
//!
//! Provides REST endpoints for class search, class details and booking,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use booking_store::{BookingRepository, ClassInstanceRepository, UserRepository};
use domain::ClassService;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::classes::AppState;

/// A store that serves every repository the class service needs.
pub trait BookingBackend:
    ClassInstanceRepository + UserRepository + BookingRepository + Clone + 'static
{
}

impl<S> BookingBackend for S where
    S: ClassInstanceRepository + UserRepository + BookingRepository + Clone + 'static
{
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: BookingBackend>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/classes/search", get(routes::classes::search::<S>))
        .route("/classes/book", post(routes::classes::book::<S>))
        .route("/classes/{id}", get(routes::classes::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a single store.
pub fn create_state<S: BookingBackend>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        service: ClassService::new(store.clone(), store.clone(), store),
    })
}
