//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::{build_router, GatewayState};
use crate::config::TollgateConfig;
use crate::error::{Result, TollgateError};

/// HTTP server for the gateway.
pub struct GatewayServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared state, including the rate limiter
    state: GatewayState,
}

impl GatewayServer {
    /// Create a server from configuration.
    pub fn new(config: TollgateConfig) -> Self {
        let addr = config.server.listen_addr;
        Self {
            addr,
            state: GatewayState::new(config),
        }
    }

    /// The shared state.
    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// The application router.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind listener");
            TollgateError::Io(e)
        })?;

        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    ///
    /// The idle counter sweeper runs for exactly as long as the server does.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let sweeper = self.state.limiter.start_sweeper();

        let limiter_config = self.state.limiter.config();
        info!(
            addr = %local_addr,
            limit = limiter_config.limit,
            window_ms = limiter_config.window.as_millis() as u64,
            "Starting HTTP gateway"
        );

        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await;

        sweeper.shutdown().await;

        result.map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TollgateError::Server(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let mut config = TollgateConfig::default();
        config.server.listen_addr = "127.0.0.1:18080".parse().unwrap();

        let server = GatewayServer::new(config);
        assert_eq!(server.addr.port(), 18080);
        assert_eq!(server.state().limiter.config().limit, 10);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = GatewayServer::new(TollgateConfig::default());
        let limiter = server.state().limiter.clone();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_on(listener, async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        let result = handle.await.unwrap();
        tokio_test::assert_ok!(result);
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
