use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Owns the token that ends a monitoring session. Cancelled by SIGTERM or
/// by whoever holds a clone of the token.
#[derive(Debug, Clone, Default)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Cancel the token on the first termination signal. The listener exits
    /// quietly if the token is cancelled some other way first.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                reason = wait_for_signal() => {
                    match reason {
                        Some(name) => tracing::info!(signal = name, "shutdown requested"),
                        None => return,
                    }
                }
            }
            token.cancel();
        });
    }
}

async fn wait_for_signal() -> Option<&'static str> {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => sigterm.recv().await.map(|()| "SIGTERM"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                None
            }
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.ok().map(|()| "Ctrl+C")
    }
}
