//! S3 API Routes
//!
//! The gateway answers bucket notification and sub-resource configuration
//! requests itself and forwards everything else to the backend.

mod notification;
mod proxy;
mod subresource;

pub use subresource::{SubresourceStore, SUPPORTED_SUBRESOURCES};

use axum::{
    body::{self, Body},
    extract::{Path, Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use prism_core::{utils::generate_request_id, Error};

use crate::events::{self, CompletedRequest};
use crate::server::AppState;

/// Largest configuration document accepted from a client
const MAX_CONFIGURATION_SIZE: usize = 1024 * 1024;

fn error_response(err: Error, request_id: &str) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let s3_error = prism_core::error::S3Error::from(err).with_request_id(request_id);

    (
        status,
        [
            ("content-type", "application/xml"),
            ("x-amz-request-id", request_id),
        ],
        s3_error.to_xml(),
    )
        .into_response()
}

fn success_response(
    status: StatusCode,
    content_type: &str,
    body: impl Into<Body>,
    request_id: &str,
) -> Response {
    (
        status,
        [
            ("content-type", content_type),
            ("x-amz-request-id", request_id),
        ],
        body.into(),
    )
        .into_response()
}

fn empty_response(status: StatusCode, request_id: &str) -> Response {
    (status, [("x-amz-request-id", request_id)]).into_response()
}

/// Distinct query keys, in order of appearance
pub(crate) fn query_keys(query: &str) -> Vec<&str> {
    let mut keys: Vec<&str> = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let key = pair.split_once('=').map_or(pair, |(k, _)| k);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// The sub-resource a request addresses: its query holds exactly one key
fn single_query_key(query: &str) -> Option<&str> {
    match query_keys(query).as_slice() {
        [key] => Some(*key),
        _ => None,
    }
}

fn is_subresource(kind: &str) -> bool {
    SUPPORTED_SUBRESOURCES.iter().any(|supported| *supported == kind)
}

async fn read_configuration(request: Request) -> Result<Bytes, Error> {
    body::to_bytes(request.into_body(), MAX_CONFIGURATION_SIZE)
        .await
        .map_err(|e| Error::InvalidRequest(format!("unable to read configuration: {}", e)))
}

// ============= Handler Dispatchers =============

/// `/` - ListBuckets and anything else without a bucket
pub async fn service_handler(State(state): State<AppState>, request: Request) -> Response {
    proxy::forward(&state, request).await
}

/// `/{bucket}` - notification and sub-resource configuration, otherwise forwarded
pub async fn bucket_handler(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    request: Request,
) -> Response {
    let query = request.uri().query().unwrap_or_default().to_string();
    let method = request.method().clone();

    // SDKs may add markers such as `x-id` next to `notification`
    if query_keys(&query).iter().any(|key| *key == "notification") {
        match method {
            Method::GET => return notification::get_bucket_notification(&state, &bucket).await,
            Method::PUT => {
                return match read_configuration(request).await {
                    Ok(body) => notification::put_bucket_notification(&state, &bucket, body).await,
                    Err(e) => error_response(e, &generate_request_id()),
                };
            }
            Method::DELETE => {
                return notification::delete_bucket_notification(&state, &bucket).await
            }
            _ => return proxy::forward(&state, request).await,
        }
    }

    match (single_query_key(&query), method) {
        (Some(kind), Method::GET) if is_subresource(kind) => {
            subresource::get_subresource(&state, kind, &bucket).await
        }
        (Some(kind), Method::PUT) if is_subresource(kind) => {
            let kind = kind.to_string();
            match read_configuration(request).await {
                Ok(body) => subresource::put_subresource(&state, &kind, &bucket, body).await,
                Err(e) => error_response(e, &generate_request_id()),
            }
        }
        (Some(kind), Method::DELETE) if is_subresource(kind) => {
            subresource::delete_subresource(&state, kind, &bucket).await
        }
        _ => proxy::forward(&state, request).await,
    }
}

/// `/{bucket}/{*key}` - forwarded, then checked for a completed write or delete
pub async fn object_handler(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    request: Request,
) -> Response {
    let event_type = events::classify(
        request.method(),
        request.uri().query().unwrap_or_default(),
        request.headers(),
    );
    let completed = event_type.map(|event_type| CompletedRequest {
        bucket,
        key,
        path: request.uri().path().to_string(),
        event_type,
        source_ip: events::source_ip(&request),
    });

    let response = proxy::forward(&state, request).await;

    if let Some(completed) = completed {
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(prism_core::utils::parse_etag);
        let request_id = response
            .headers()
            .get("x-amz-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        events::notify_if_completed(&state, completed, response.status(), etag, request_id);
    }

    response
}
