use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Serves `router` on `addr` until ctrl-c or SIGTERM.
///
/// `on_shutdown` runs as soon as the signal arrives, before open connections
/// drain, so live feeds can be closed instead of holding the process open.
pub async fn serve<F>(addr: SocketAddr, router: Router, on_shutdown: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "tribute board listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let signal = shutdown_signal().await;
        tracing::info!(signal, "shutdown requested");
        on_shutdown();
    })
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "ctrl_c",
            _ = terminate.recv() => "terminate",
        },
        Err(err) => {
            tracing::warn!(error = %err, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            "ctrl_c"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl_c"
}
