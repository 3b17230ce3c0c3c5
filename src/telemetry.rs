use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,microgrid_dispatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Cancels `run` on Ctrl+C or SIGTERM. Returns without signalling once `run`
/// has been cancelled some other way.
pub async fn cancel_on_shutdown(run: CancellationToken) {
    let interrupted = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminated = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminated = std::future::pending::<()>();

    tokio::select! {
        _ = run.cancelled() => return,
        _ = interrupted => info!(signal = "ctrl_c", "cancelling rolling-horizon run"),
        _ = terminated => info!(signal = "sigterm", "cancelling rolling-horizon run"),
    }
    run.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_watcher_stops_when_run_is_already_cancelled() {
        let run = CancellationToken::new();
        run.cancel();

        let stopped =
            tokio::time::timeout(Duration::from_secs(1), cancel_on_shutdown(run.clone())).await;

        assert!(stopped.is_ok());
        assert!(run.is_cancelled());
    }
}
