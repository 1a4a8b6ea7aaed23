//! Prometheus metrics server for the example scheduler.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;

/// Initialize the metrics recorder and return a handle for the HTTP
/// endpoint.
///
/// Must be called once at startup, before any metrics are recorded.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Serve the `/metrics` endpoint on `addr` from a background task.
///
/// # Errors
///
/// Returns an error if the listener cannot bind.
pub async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> anyhow::Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("metrics server error: {}", e);
        }
    });

    Ok(())
}
