use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header::CONTENT_LENGTH},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

use crate::client_ip::client_address;
use crate::gatekeeper::{Admission, Gatekeeper};

pub const BLOCKED_MESSAGE: &str = "Your IP has been blocked.";

/// Request-interception hook. Apply with
/// `axum::middleware::from_fn_with_state(gatekeeper, guard)`.
///
/// Store I/O runs on the blocking pool. If that fails the request is
/// forwarded rather than left hanging.
pub async fn guard(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let addr = client_address(request.headers(), peer);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let admission = {
        let gatekeeper = Arc::clone(&gatekeeper);
        let (addr, method, path) = (addr.clone(), method.clone(), path.clone());
        tokio::task::spawn_blocking(move || gatekeeper.admit(addr.as_deref(), &method, &path))
            .await
    };

    let should_log = match admission {
        Ok(Admission::Blocked) => return (StatusCode::FORBIDDEN, BLOCKED_MESSAGE).into_response(),
        Ok(Admission::Admitted { log }) => log,
        Err(e) => {
            error!(error = %e, "admission check failed, forwarding request");
            false
        }
    };

    if !should_log {
        return next.run(request).await;
    }

    let (request, body) = capture_body(request, gatekeeper.config().max_body_capture).await;
    let endpoint = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or(path);
    let entry = gatekeeper.build_entry(addr.as_deref(), &method, &endpoint, request.headers(), body);

    let recorder = Arc::clone(&gatekeeper);
    if let Err(e) = tokio::task::spawn_blocking(move || recorder.record(entry)).await {
        error!(error = %e, "request log task failed");
    }

    next.run(request).await
}

/// Block-only hook: rejects banned addresses and lets everything else
/// through without counting or logging it. Apply with
/// `axum::middleware::from_fn_with_state(gatekeeper, block_only)`.
pub async fn block_only(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let addr = client_address(request.headers(), peer);

    if gatekeeper.rejects(addr.as_deref()) {
        return (StatusCode::FORBIDDEN, BLOCKED_MESSAGE).into_response();
    }
    next.run(request).await
}

// Buffer the body for the log entry and hand an identical one to the next handler.
// Bodies without a declared length, or larger than `limit`, are left untouched.
async fn capture_body(request: Request, limit: usize) -> (Request, serde_json::Value) {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    match declared {
        Some(len) if len > 0 && len <= limit => {}
        _ => return (request, serde_json::Value::Null),
    }

    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => {
            let value = body_value(&bytes);
            (Request::from_parts(parts, Body::from(bytes)), value)
        }
        Err(e) => {
            // body stream already consumed, forward what is left: nothing
            warn!(error = %e, "failed to read request body for logging");
            (Request::from_parts(parts, Body::empty()), serde_json::Value::Null)
        }
    }
}

fn body_value(bytes: &Bytes) -> serde_json::Value {
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_value_prefers_json() {
        assert_eq!(
            body_value(&Bytes::from_static(br#"{"a":1}"#)),
            serde_json::json!({"a": 1})
        );
        assert_eq!(
            body_value(&Bytes::from_static(b"name=x&y=2")),
            serde_json::Value::String("name=x&y=2".into())
        );
        assert_eq!(body_value(&Bytes::new()), serde_json::Value::Null);
    }
}
