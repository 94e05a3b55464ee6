//! Process entry point: RPC server plus the saga consumers.

use api::{Config, Services, Stores};
use tokio::signal;
use tokio::sync::watch;
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

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the storage backend
    let stores = match &config.database_url {
        Some(url) => {
            let pool = api::connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            tracing::info!("using PostgreSQL stores");
            Stores::postgres(pool)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stores");
            Stores::in_memory()
        }
    };

    // 4. Wire services and start the consumers
    let services = Services::new(&config, stores).expect("invalid configuration");
    if config.database_url.is_none() {
        api::seed_demo_data(&services.state)
            .await
            .expect("failed to seed demo data");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = services.spawn_background(config.consumer_poll, shutdown_rx);

    // 5. Build the application
    let app = api::create_app(services.state.clone(), metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, node_id = config.node_id, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop consumers after in-flight requests drain
    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "background task failed");
        }
    }

    tracing::info!("server shut down gracefully");
}
