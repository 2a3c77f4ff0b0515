//! Bucket Notification Configuration handlers

use axum::{http::StatusCode, response::Response};
use bytes::Bytes;
use prism_core::{
    utils::{generate_request_id, validate_bucket_name},
    Error,
};
use prism_events::NotifyError;
use tracing::{debug, error, info};

use super::{empty_response, error_response, success_response};
use crate::server::AppState;
use crate::xml;

/// GET /{bucket}?notification
pub(crate) async fn get_bucket_notification(state: &AppState, bucket: &str) -> Response {
    let request_id = generate_request_id();
    debug!("GetBucketNotificationConfiguration bucket={} request_id={}", bucket, request_id);

    match state.notifications.configuration(bucket) {
        Some(config) => success_response(
            StatusCode::OK,
            "application/xml",
            xml::notification_configuration_response(&config),
            &request_id,
        ),
        None => error_response(
            Error::NoSuchNotificationConfiguration(bucket.to_string()),
            &request_id,
        ),
    }
}

/// PUT /{bucket}?notification
///
/// The configuration is persisted and then swapped in for the bucket's
/// current one.
pub(crate) async fn put_bucket_notification(
    state: &AppState,
    bucket: &str,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    debug!("PutBucketNotificationConfiguration bucket={} request_id={}", bucket, request_id);

    if let Err(e) = validate_bucket_name(bucket) {
        return error_response(e, &request_id);
    }

    let config = match xml::parse_notification_configuration(&body) {
        Ok(config) => config,
        Err(e) => {
            return error_response(
                Error::MalformedXML(format!("Invalid notification configuration: {}", e)),
                &request_id,
            );
        }
    };

    if config.is_empty() {
        return error_response(
            Error::InvalidArgument(
                "notification configuration must contain at least one CloudFunctionConfiguration"
                    .into(),
            ),
            &request_id,
        );
    }

    let targets = config.len();
    match state.notifications.save(bucket, config).await {
        Ok(()) => {
            info!("Bucket notification configuration set for {} ({} targets)", bucket, targets);
            empty_response(StatusCode::OK, &request_id)
        }
        Err(NotifyError::Configuration(e)) => error_response(Error::Configuration(e), &request_id),
        Err(e) => {
            error!("Error saving notification config for {}: {}", bucket, e);
            error_response(Error::InternalError(e.to_string()), &request_id)
        }
    }
}

/// DELETE /{bucket}?notification
pub(crate) async fn delete_bucket_notification(state: &AppState, bucket: &str) -> Response {
    let request_id = generate_request_id();
    debug!("DeleteBucketNotificationConfiguration bucket={} request_id={}", bucket, request_id);

    if let Err(e) = validate_bucket_name(bucket) {
        return error_response(e, &request_id);
    }

    match state.notifications.remove(bucket).await {
        Ok(existed) => {
            if existed {
                info!("Bucket notification configuration deleted for {}", bucket);
            }
            empty_response(StatusCode::NO_CONTENT, &request_id)
        }
        Err(e) => {
            error!("Error deleting notification config for {}: {}", bucket, e);
            error_response(Error::InternalError(e.to_string()), &request_id)
        }
    }
}
