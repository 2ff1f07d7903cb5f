use std::io::IsTerminal;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use db_assistant_backend::api::routes::{build_state, create_router};
use db_assistant_backend::config::{Config, LoggingConfig};

fn init_logging(logging: &LoggingConfig) {
    let ansi = match logging.style.as_str() {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
        )
        .with_ansi(ansi)
        .init();
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    init_logging(&config.logging);

    info!("Starting server on {}", config.server_address());

    let state = build_state(&config);
    let service = state.service.clone();
    let app = create_router(state);

    let addr: SocketAddr = config.server_address().parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!("Failed to bind {}: {}", addr, e);
        e
    })?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    service.registry().shutdown().await;
    info!("Server stopped");

    Ok(())
}
