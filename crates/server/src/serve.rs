//! Server lifecycle: bind, serve, sweep, shut down.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use gatehouse_ratelimit::FixedWindowLimiter;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{router::router, state::AppState};

/// Handle returned by [`serve`]: the bound address and a shutdown trigger.
pub struct ServeHandle {
    /// The address the server is listening on.
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<std::io::Result<()>>>,
    sweeper: JoinHandle<()>,
}

impl ServeHandle {
    /// Stops accepting connections, drains in-flight requests and waits
    /// for the server to stop.
    ///
    /// # Errors
    ///
    /// Returns the server task's I/O error, or a join error if it panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.sweeper.abort();
        if let Some(join) = self.join.take() {
            join.await??;
        }
        Ok(())
    }
}

/// Drops expired limiter windows every `period` until aborted.
pub fn spawn_sweeper(limiter: Arc<FixedWindowLimiter>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limiter.sweep_expired();
        }
    })
}

/// Binds `addr` and serves the router over `state` in a spawned task.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(state: AppState, addr: &str) -> Result<ServeHandle> {
    let limiter = Arc::clone(state.gate.limiter());
    let sweep_period = limiter.config().window();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "gatehouse listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("received shutdown signal");
            })
            .await
    });

    Ok(ServeHandle {
        addr,
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
        sweeper: spawn_sweeper(limiter, sweep_period),
    })
}
