use std::time::Duration;

use pulse_stream::Hub;
use tracing::{info, warn};

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, Ctrl-C only");
                ctrl_c().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await
    }
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        // nothing left to wait on; never resolve rather than shut down at once
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// Graceful-shutdown future for `axum::serve`: waits for a signal, then
/// closes every stream client before the HTTP server stops.
pub async fn drain_on_signal(hub: Hub, grace: Duration) {
    let signal = wait_for_signal().await;
    info!(signal, clients = hub.client_count(), "shutdown signal received");
    drain(&hub, grace).await;
}

/// Run `Hub::shutdown`, giving up after `grace`.
pub async fn drain(hub: &Hub, grace: Duration) {
    match tokio::time::timeout(grace, hub.shutdown()).await {
        Ok(()) => info!("all stream clients closed"),
        Err(_) => warn!(
            grace_secs = grace.as_secs(),
            remaining = hub.client_count(),
            "hub shutdown timed out, stopping anyway"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_stops_accepting() {
        let hub = Hub::default();
        drain(&hub, Duration::from_secs(1)).await;
        assert!(!hub.is_accepting());
        assert_eq!(hub.client_count(), 0);
    }
}
