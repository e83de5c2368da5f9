//! The `sense-api` crate is the HTTP-facing half of the SENSE gateway. It
//! manages devices, queues commands for them and exposes the telemetry they
//! report, all through the shared [`sensedb::Store`].
//!
//! Whenever a device is registered its uuid is published on the
//! registration channel, so the device-facing process can open endpoints
//! for it without a restart.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

use std::{future::Future, net::SocketAddr};
use tokio::net::TcpListener;

/// Bind `addr` and serve the API until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> ApiResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        log::error!("Unable to bind to {addr}: {e}");
        ApiError::Io(e)
    })?;
    log::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    log::info!("HTTP server shut down");
    Ok(())
}
