//! HTTP middleware mounted in front of the health routes.
use crate::logging::Logger;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identifiers of the request being served, passed explicitly down to the checkers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub trace_id: String,
    pub request_id: String,
}

impl RequestContext {
    /// Keeps the caller's trace id when it sent one, and always issues a fresh request id.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let trace_id = headers
            .get(TRACE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_id);

        RequestContext {
            trace_id,
            request_id: generate_id(),
        }
    }
}

/// Generates a random 16 hex digit identifier.
pub fn generate_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Attaches a [`RequestContext`] to the request, echoes its ids on the response and logs
/// one line per request.
pub async fn trace_requests(
    State(logger): State<Logger>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let context = RequestContext::from_headers(request.headers());
    request.extensions_mut().insert(context.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&context.trace_id) {
        headers.insert(TRACE_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&context.request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    logger.for_request(Some(&context)).info(format_args!(
        "HTTP request method={} path={} status_code={} duration={:?}",
        method,
        path,
        response.status().as_u16(),
        start.elapsed()
    ));

    response
}
