//! Liveness endpoint: `GET /` answers as long as the process is up.

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Environment variable consulted when the config sets no port.
pub const PORT_ENV: &str = "PORT";

const LIVENESS_BODY: &str = "Worker is running";

pub fn router() -> Router {
    Router::new().route("/", get(liveness))
}

async fn liveness() -> &'static str {
    LIVENESS_BODY
}

/// The configured port, else `$PORT`. `None` disables the endpoint.
pub fn resolve_port(configured: Option<u16>, env_value: Option<&str>) -> Option<u16> {
    configured.or_else(|| env_value.and_then(|v| v.trim().parse().ok()))
}

/// Serves [`router`] on `listener` until `cancel` fires.
pub async fn serve(listener: TcpListener, cancel: CancellationToken) -> std::io::Result<()> {
    axum::serve(listener, router())
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
}

/// Binds `0.0.0.0:port` and serves in the background. A bind failure is
/// logged and the worker carries on without the endpoint.
pub async fn spawn(port: u16, cancel: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Health endpoint disabled, cannot bind {}: {}", addr, e);
            return;
        }
    };
    info!("Health endpoint listening on http://{}", addr);
    tokio::spawn(async move {
        if let Err(e) = serve(listener, cancel).await {
            warn!("Health endpoint stopped: {}", e);
        }
    });
}
