//! Forwarding to the backend

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use prism_core::{utils::generate_request_id, Error};
use tracing::{debug, error, info};

use super::error_response;
use crate::backend::is_hop_by_hop;
use crate::server::AppState;

/// Forward a request and relay the backend's answer.
///
/// Successful bodies stream through untouched. Error bodies are small, so
/// they are buffered and logged on the way back.
pub(crate) async fn forward(state: &AppState, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();
    let query = parts.uri.query().unwrap_or_default();

    debug!("Forwarding {} {}", parts.method, parts.uri);
    let mut outbound = state
        .backend
        .request(parts.method.clone(), path, query, &parts.headers);
    // A bodiless request must not turn into an empty chunked one
    if parts.headers.contains_key(header::CONTENT_LENGTH)
        || parts.headers.contains_key(header::TRANSFER_ENCODING)
    {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let result = outbound.send().await;

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            error!("Backend request {} {} failed: {}", parts.method, parts.uri, e);
            return error_response(Error::Backend(e.to_string()), &generate_request_id());
        }
    };

    let status = response.status();
    let mut headers = HeaderMap::with_capacity(response.headers().len());
    for (name, value) in response.headers() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    if status.is_success() {
        let body = Body::from_stream(response.bytes_stream());
        return (status, headers, body).into_response();
    }

    match response.bytes().await {
        Ok(bytes) => {
            info!(
                "Backend answered {} {} with {}: {}",
                parts.method,
                parts.uri,
                status,
                String::from_utf8_lossy(&bytes)
            );
            (status, headers, Body::from(bytes)).into_response()
        }
        Err(e) => {
            error!(
                "Unable to read backend error body for {} {}: {}",
                parts.method, parts.uri, e
            );
            error_response(Error::Backend(e.to_string()), &generate_request_id())
        }
    }
}

