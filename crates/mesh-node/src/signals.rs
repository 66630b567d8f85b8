//! Termination signal handling.
//!
//! Unix: SIGINT (ctrl-c) or SIGTERM. Elsewhere: ctrl-c only.

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => tracing::info!(signal = "SIGINT", "termination signal received"),
        _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "termination signal received"),
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "termination signal received");
    Ok(())
}
