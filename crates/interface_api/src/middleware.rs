//! API middleware

use std::time::Instant;

use axum::{
    body::Body,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use tracing::info;

/// Header naming the operator behind a write request
pub const OPERATOR_HEADER: &str = "x-operator";

/// Audit logging middleware
///
/// Every write (events, operator actions, rule changes) is logged with the
/// operator header, the status and the latency. Reads are left to the trace
/// layer.
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    if request.method() == Method::GET {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let uri = request.uri().clone();
    let operator = request
        .headers()
        .get(OPERATOR_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("system")
        .to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        operator = %operator,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "API write"
    );
    response
}
