use tokio::signal;

/// Resolves on SIGINT or SIGTERM. The consumer finishes settling the
/// in-flight delivery before acting on it.
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                let _ = signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
}
