//! Server lifecycle around a [`Router`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::events::{EventKind, EventPipeline, Payload};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Owns a router and its configuration, and drives the start/stop events.
///
/// Transport is out of scope: feed requests through [`Server::handle`] from
/// whatever listener the application runs.
#[derive(Debug)]
pub struct Server {
    router: Arc<Router>,
    config: ServerConfig,
    running: AtomicBool,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Creates a server with the default configuration.
    pub fn new() -> Self {
        let config = ServerConfig::default();
        Self {
            router: Arc::new(Router::with_config(&config)),
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Creates a server from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`](crate::RouterError::Config) if the
    /// configuration is invalid.
    pub fn with_config(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            router: Arc::new(Router::with_config(&config)),
            config,
            running: AtomicBool::new(false),
        })
    }

    /// Returns the router.
    pub const fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the router's event pipeline.
    pub fn pipeline(&self) -> &Arc<EventPipeline> {
        self.router.pipeline()
    }

    /// Marks the server as running and emits the server-start event.
    ///
    /// Calling it on a running server does nothing.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(addr = %self.config.addr, "Server already running");
            return;
        }
        info!(
            addr = %self.config.addr,
            dev_mode = self.config.dev_mode,
            "Server starting"
        );
        self.pipeline().emit(EventKind::ServerStart, Payload::Empty);
    }

    /// Emits the server-stop event and marks the server stopped.
    ///
    /// Only the first call on a running server has any effect.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(
            addr = %self.config.addr,
            graceful = self.config.graceful_shutdown,
            timeout_secs = self.config.shutdown_timeout.as_secs(),
            "Server shutting down"
        );
        self.pipeline().emit(EventKind::ServerStop, Payload::Empty);
    }

    /// Returns true between [`start`](Self::start) and
    /// [`shutdown`](Self::shutdown).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Dispatches a request through the router.
    pub async fn handle(&self, request: Request) -> Response {
        self.router.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::RouterError;
    use crate::middleware::handler;

    #[test]
    fn test_start_and_shutdown_emit_once() {
        let server = Server::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        {
            let starts = starts.clone();
            server.pipeline().on_server_start(move || {
                starts.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let stops = stops.clone();
            server.pipeline().on_server_stop(move || {
                stops.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(!server.is_running());
        server.start();
        server.start();
        assert!(server.is_running());
        server.shutdown();
        server.shutdown();
        assert!(!server.is_running());

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ServerConfig {
            addr: String::new(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            Server::with_config(config),
            Err(RouterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_handle_delegates_to_router() {
        let server = Server::new();
        server
            .router()
            .get("/health", handler(|ctx| Box::pin(async move { ctx.text(200, "ok") })))
            .unwrap();

        let res = server.handle(Request::get("/health")).await;
        assert_eq!(res.status, 200);
    }
}
