//! The three HTTP views of service health: liveness, readiness and the full diagnostic report.

use crate::checks::{CheckContext, HealthRegistry};
use crate::logging::Logger;
use crate::middleware::RequestContext;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::time::Duration;
use thiserror::Error;

pub const LIVE_PATH: &str = "/health/live";
pub const READY_PATH: &str = "/health/ready";
pub const DIAGNOSTIC_PATH: &str = "/health";

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("failed to serialize health report: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for ResponseError {
    /// Reported as an internal error, never as an unhealthy dependency.
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

#[derive(Clone)]
pub struct HealthResponder {
    registry: HealthRegistry,
    readiness_timeout: Duration,
    diagnostic_timeout: Duration,
    logger: Logger,
}

impl HealthResponder {
    pub fn new(
        registry: HealthRegistry,
        readiness_timeout: Duration,
        diagnostic_timeout: Duration,
        logger: Logger,
    ) -> Self {
        HealthResponder {
            registry,
            readiness_timeout,
            diagnostic_timeout,
            logger: logger.named("health::http"),
        }
    }

    pub fn registry(&self) -> &HealthRegistry {
        &self.registry
    }

    /// Routes for the three health endpoints, ready to be merged into the host's router.
    pub fn router(&self) -> Router {
        Router::new()
            .route(LIVE_PATH, get(live_handler))
            .route(READY_PATH, get(ready_handler))
            .route(DIAGNOSTIC_PATH, get(diagnostic_handler))
            .with_state(self.clone())
    }

    /// Runs a pass under the readiness deadline. Only the verdict is exposed.
    pub async fn readiness(&self, request: Option<RequestContext>) -> (StatusCode, &'static str) {
        let ctx = CheckContext::with_timeout(self.readiness_timeout).for_request(request);
        let report = self.registry.run_all(&ctx).await;

        if report.is_healthy() {
            (StatusCode::OK, "ready")
        } else {
            self.logger
                .for_request(ctx.request())
                .warn("Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready")
        }
    }

    /// Runs a pass under the diagnostic deadline and returns the whole report as JSON.
    pub async fn diagnostic(
        &self,
        request: Option<RequestContext>,
    ) -> Result<Response, ResponseError> {
        let ctx = CheckContext::with_timeout(self.diagnostic_timeout).for_request(request);
        let report = self.registry.run_all(&ctx).await;

        let body = serde_json::to_vec(&report).map_err(|e| {
            self.logger
                .for_request(ctx.request())
                .error(format_args!("Failed to encode health report: {}", e));
            e
        })?;
        let status = if report.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        Ok((status, [(CONTENT_TYPE, "application/json")], body).into_response())
    }
}

async fn live_handler() -> &'static str {
    "alive"
}

async fn ready_handler(
    State(responder): State<HealthResponder>,
    request: Request,
) -> (StatusCode, &'static str) {
    responder.readiness(request_context(&request)).await
}

async fn diagnostic_handler(
    State(responder): State<HealthResponder>,
    request: Request,
) -> Result<Response, ResponseError> {
    responder.diagnostic(request_context(&request)).await
}

fn request_context(request: &Request) -> Option<RequestContext> {
    request.extensions().get::<RequestContext>().cloned()
}
