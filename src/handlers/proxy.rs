use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

// Largest request body forwarded upstream
const MAX_FORWARD_BODY: usize = 32 * 1024 * 1024;

const HOP_BY_HOP: [header::HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::CONTENT_LENGTH,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

// Forward an admitted request to the upstream and relay its response
pub async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = format!("{}{}", state.upstream.trim_end_matches('/'), path);

    let bytes = match axum::body::to_bytes(body, MAX_FORWARD_BODY).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let result = state
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(bytes)
        .send()
        .await;

    let res = match result {
        Ok(res) => res,
        Err(e) => {
            warn!(url = %url, error = %e, "upstream request failed");
            return (StatusCode::BAD_GATEWAY, "Upstream unavailable").into_response();
        }
    };

    let status = res.status();
    let mut headers = res.headers().clone();
    strip_hop_by_hop(&mut headers);

    match res.bytes().await {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            warn!(url = %url, error = %e, "failed to read upstream response");
            (StatusCode::BAD_GATEWAY, "Upstream response incomplete").into_response()
        }
    }
}
