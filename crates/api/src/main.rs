//! API server entry point.

use api::config::{Config, LogFormat};
use booking_store::{InMemoryBookingStore, PostgresBookingStore, SeedData};
use chrono::Utc;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open the store and build the application
    let app = match config.database_url.as_deref() {
        Some(database_url) => {
            let store = PostgresBookingStore::connect(database_url, config.database_max_connections)
                .await
                .expect("failed to connect to database");

            if config.run_migrations {
                store
                    .run_migrations()
                    .await
                    .expect("failed to run migrations");
            }
            if config.seed_demo_data {
                store
                    .seed(&SeedData::demo(Utc::now()))
                    .await
                    .expect("failed to seed demo data");
                tracing::info!("demo timetable loaded");
            }

            tracing::info!(
                max_connections = config.database_max_connections,
                "using PostgreSQL booking store"
            );
            api::create_app(api::create_state(store), metrics_handle)
        }
        None => {
            let store = InMemoryBookingStore::with_seed(&SeedData::demo(Utc::now())).await;
            tracing::warn!("DATABASE_URL not set, using in-memory booking store with demo data");
            api::create_app(api::create_state(store), metrics_handle)
        }
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
