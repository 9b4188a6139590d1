//! Warehouse consumer entry point.

use std::sync::Arc;

use broker::AmqpConnection;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use warehouse::{Config, ConsumerWorkerPool, OrderTracker};

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
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        url = %config.broker_url,
        queue = %config.queue_name,
        num_workers = config.num_workers,
        "starting warehouse consumer"
    );

    let conn = AmqpConnection::connect(&config.broker_url)
        .await
        .expect("failed to connect to broker");
    let conn: Arc<dyn broker::BrokerConnection> = Arc::new(conn);

    let tracker = Arc::new(OrderTracker::new());
    let pool = ConsumerWorkerPool::start(
        Arc::clone(&conn),
        &config.queue_name,
        config.num_workers,
        Arc::clone(&tracker),
    )
    .await
    .expect("failed to start consumer workers");

    shutdown_signal().await;

    // Closing the connection ends every delivery stream; stop() waits for
    // each worker to finish the message in hand.
    pool.stop().await;
    tracker.print_summary();

    tracing::info!("warehouse consumer shut down gracefully");
}
