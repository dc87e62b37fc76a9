use crate::config::ServerConfig;
use crate::logging::Logger;
use crate::middleware::trace_requests;
use crate::responder::HealthResponder;
use crate::shutdown::{hook_fn, ShutdownHook};
use axum::Router;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

struct Running {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// HTTP server hosting the health endpoints.
pub struct Server {
    config: ServerConfig,
    responder: HealthResponder,
    logger: Logger,
    running: Option<Running>,
}

impl Server {
    pub fn new(config: ServerConfig, responder: HealthResponder, logger: Logger) -> Self {
        Server {
            config,
            responder,
            logger: logger.named("server"),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The address the server listens on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    pub fn app(&self) -> Router {
        instrument(self.responder.router(), self.logger.clone())
    }

    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.is_running() {
            self.logger.warn("Server is already running.");
            return Err(ServerError::AlreadyRunning);
        }

        let addr = format!("{}:{}", self.config.address, self.config.port);
        self.logger.debug(format_args!("Connecting to {}", addr));
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.logger
                    .error(format_args!("Failed to bind to {}: {}", addr, source));
                return Err(ServerError::Bind { addr, source });
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (stop, stopped) = oneshot::channel();
        let app = self.app();
        let logger = self.logger.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    stopped.await.ok();
                })
                .await;
            if let Err(e) = result {
                logger.error(format_args!("Server error: {}", e));
            }
        });

        self.running = Some(Running {
            local_addr,
            stop,
            handle,
        });
        self.logger
            .info(format_args!("Server started. address={}", local_addr));
        Ok(local_addr)
    }

    /// Stops accepting connections and waits for in-flight requests to finish.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        // The receiver is gone only if the server task already ended.
        let _ = running.stop.send(());
        if let Err(e) = running.handle.await {
            self.logger
                .error(format_args!("Server task did not finish cleanly: {}", e));
        }
        self.logger.info("Server stopped.");
    }
}

/// Shutdown hook that stops `server`.
pub fn stop_hook(server: Arc<Mutex<Server>>) -> impl ShutdownHook {
    hook_fn("http-server", move |_| {
        let server = server.clone();
        async move {
            server.lock().await.stop().await;
            Ok(())
        }
    })
}

/// Puts the request tracing middleware and panic recovery in front of `router`.
pub fn instrument(router: Router, logger: Logger) -> Router {
    router
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            logger.named("http"),
            trace_requests,
        ))
        .layer(TraceLayer::new_for_http())
}
