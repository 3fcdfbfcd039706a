//! Multi-tenant query gateway
//!
//! A long-running HTTP service mediating browser access to PostgreSQL,
//! MySQL, and MongoDB through a signed request API. Configuration is
//! sourced entirely from the process environment; see `config` for the
//! full variable list.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use gateway::{app::App, config::Config, error::GatewayError, Result};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize_logging();

    let config = Config::from_env()?;
    let app = App::new(config);
    app.spawn_background_tasks();

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .map_err(|e| GatewayError::server(format!("invalid BIND_ADDR: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "query gateway listening");

    let router = gateway::http::router(app);
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

/// Initialize logging. Level comes from `RUST_LOG`, defaulting to `info`
/// when unset, matching the teacher's plain `tracing_subscriber::fmt()`
/// setup rather than a file-rotating layer stack this service has no
/// use for.
fn initialize_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Waits for Ctrl+C or SIGTERM so `axum::serve` can drain in-flight
/// requests before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_module_structure() {
        assert!(!gateway::version().is_empty());
    }
}
