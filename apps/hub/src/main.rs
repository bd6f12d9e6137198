use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tandem_hub::{build_router, Config, FreshnessFilter, Hub, HubHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_hub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!(
        environment = %config.environment(),
        queue_capacity = config.queue_capacity,
        mailbox_capacity = config.mailbox_capacity,
        freshness_window_secs = config.freshness_window.as_secs(),
        "Starting Tandem hub"
    );

    let hub =
        Hub::new(FreshnessFilter::new(config.freshness_window)).spawn(config.mailbox_capacity);

    let addr = config.server().bind_addr();
    let app = build_router(config, hub.clone());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Listening on {}", addr);
    tracing::info!("WebSocket endpoint available at ws://{}/ws/:user_id", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then stop the hub so every socket gets a close frame
async fn shutdown_signal(hub: HubHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    if let Err(e) = hub.shutdown().await {
        tracing::warn!(error = %e, "Hub already stopped");
    }
}
