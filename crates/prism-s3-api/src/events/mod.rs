//! Completion detection
//!
//! Decides which forwarded object requests completed a write or delete and
//! hands the resulting events to the notification engine.

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method, StatusCode},
};
use prism_core::types::{NotificationEvent, S3EventType};
use prism_core::UNKNOWN_OBJECT_SIZE;
use prism_events::NotifyError;
use std::net::SocketAddr;
use tracing::{debug, warn, Instrument, Span};

use crate::routes::query_keys;
use crate::server::AppState;

/// Object sub-resources. Requests on them never change object data.
const OBJECT_SUBRESOURCES: &[&str] = &[
    "acl",
    "attributes",
    "legal-hold",
    "restore",
    "retention",
    "select",
    "tagging",
    "torrent",
];

/// Event a request on an object key would produce if it succeeds
pub fn classify(method: &Method, query: &str, headers: &HeaderMap) -> Option<S3EventType> {
    let keys = query_keys(query);
    let has = |name: &str| keys.iter().any(|key| *key == name);

    if keys
        .iter()
        .any(|key| OBJECT_SUBRESOURCES.iter().any(|sub| sub == key))
    {
        return None;
    }

    match *method {
        // UploadPart and UploadPartCopy
        Method::PUT if has("uploadId") || has("partNumber") => None,
        Method::PUT if headers.contains_key("x-amz-copy-source") => {
            Some(S3EventType::ObjectCreatedCopy)
        }
        Method::PUT => Some(S3EventType::ObjectCreatedPut),
        Method::POST if has("uploads") => None,
        Method::POST if has("uploadId") => Some(S3EventType::ObjectCreatedCompleteMultipartUpload),
        // Browser form uploads are posted to the bucket, never to a key
        Method::POST => None,
        // AbortMultipartUpload
        Method::DELETE if has("uploadId") => None,
        Method::DELETE => Some(S3EventType::ObjectRemovedDelete),
        _ => None,
    }
}

/// Client address: first `X-Forwarded-For` hop, else the peer
pub fn source_ip(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

/// An object request that may produce an event once the backend answers
#[derive(Debug, Clone)]
pub struct CompletedRequest {
    pub bucket: String,
    pub key: String,
    /// Request path as the client sent it
    pub path: String,
    pub event_type: S3EventType,
    pub source_ip: String,
}

/// Emit the request's event if the backend accepted it.
///
/// Runs off the response path: the client's response is never delayed.
pub fn notify_if_completed(
    state: &AppState,
    completed: CompletedRequest,
    status: StatusCode,
    etag: Option<String>,
    request_id: Option<String>,
) {
    if !status.is_success() {
        warn!(
            "{} on {}/{} was not completed (status {}), no event sent",
            completed.event_type, completed.bucket, completed.key, status
        );
        return;
    }

    if !state.notifications.is_registered(&completed.bucket) {
        debug!("No notification configuration for bucket {}", completed.bucket);
        return;
    }

    let mut event = NotificationEvent::new(
        completed.bucket.clone(),
        completed.key.clone(),
        completed.event_type,
    )
    .with_source_ip(completed.source_ip.clone());
    if let Some(request_id) = request_id {
        event = event.with_request_id(request_id);
    }

    let state = state.clone();
    tokio::spawn(
        async move {
            let event = match completed.event_type {
                S3EventType::ObjectRemoved | S3EventType::ObjectRemovedDelete => event.with_size(0),
                _ => {
                    let stat = state.backend.stat(&completed.path).await;
                    let size = stat.as_ref().map_or(UNKNOWN_OBJECT_SIZE, |s| s.size);
                    let etag = etag.or_else(|| stat.and_then(|s| s.etag));
                    let event = event.with_size(size);
                    match etag {
                        Some(etag) => event.with_etag(etag),
                        None => event,
                    }
                }
            };

            match state.notifications.process_event(event).await {
                Ok(()) => debug!(
                    "Queued {} for {}/{}",
                    completed.event_type, completed.bucket, completed.key
                ),
                Err(NotifyError::NotRegistered { bucket }) => {
                    debug!("Notification configuration for {} went away", bucket)
                }
                Err(e) => warn!(
                    "Unable to queue {} for {}/{}: {}",
                    completed.event_type, completed.bucket, completed.key, e
                ),
            }
        }
        .instrument(Span::current()),
    );
}
