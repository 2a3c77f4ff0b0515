//! Raw bucket sub-resource configurations
//!
//! Some backends reject bucket configuration calls that SDKs and Terraform
//! make as a matter of course. The gateway keeps these documents itself,
//! verbatim, one file per bucket under `<data_dir>/<kind>/`.

use axum::{http::StatusCode, response::Response};
use bytes::Bytes;
use prism_core::{
    config::StorageConfig,
    utils::{generate_request_id, validate_bucket_name},
    Error,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{empty_response, error_response, success_response};
use crate::server::AppState;
use crate::xml;

/// Sub-resources stored by the gateway instead of the backend
pub const SUPPORTED_SUBRESOURCES: &[&str] = &[
    "accelerate",
    "acl",
    "cors",
    "encryption",
    "lifecycle",
    "logging",
    "object-lock",
    "policy",
    "replication",
    "requestPayment",
    "tagging",
    "versioning",
    "website",
];

#[derive(Debug, Clone)]
pub struct SubresourceStore {
    storage: StorageConfig,
}

impl SubresourceStore {
    pub fn new(storage: StorageConfig) -> Self {
        Self { storage }
    }

    pub fn path(&self, kind: &str, bucket: &str) -> PathBuf {
        self.storage
            .subresource_dir(kind)
            .join(format!("{}.xml", bucket))
    }

    pub async fn load(&self, kind: &str, bucket: &str) -> std::io::Result<Option<Bytes>> {
        match fs::read(self.path(kind, bucket)).await {
            Ok(content) => Ok(Some(Bytes::from(content))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, kind: &str, bucket: &str, body: &[u8]) -> std::io::Result<()> {
        let path = self.path(kind, bucket);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        write_atomic(&path, body).await
    }

    /// Returns whether a document existed
    pub async fn delete(&self, kind: &str, bucket: &str) -> std::io::Result<bool> {
        match fs::remove_file(self.path(kind, bucket)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

async fn write_atomic(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    fs::write(&temp, body).await?;
    fs::rename(&temp, path).await
}

fn content_type(kind: &str) -> &'static str {
    match kind {
        "policy" => "application/json",
        _ => "application/xml",
    }
}

/// GET /{bucket}?<kind>
pub(crate) async fn get_subresource(state: &AppState, kind: &str, bucket: &str) -> Response {
    let request_id = generate_request_id();
    debug!("GetBucket {} bucket={} request_id={}", kind, bucket, request_id);

    if let Err(e) = validate_bucket_name(bucket) {
        return error_response(e, &request_id);
    }

    let stored = match state.subresources.load(kind, bucket).await {
        Ok(stored) => stored,
        Err(e) => {
            error!("Error reading {} configuration for {}: {}", kind, bucket, e);
            return error_response(Error::Io(e), &request_id);
        }
    };

    let body = if kind == "accelerate" {
        let status = stored
            .as_deref()
            .and_then(xml::parse_accelerate_status)
            .unwrap_or_else(|| xml::DEFAULT_ACCELERATE_STATUS.to_string());
        Bytes::from(xml::accelerate_configuration_response(&status))
    } else {
        stored.unwrap_or_default()
    };

    success_response(StatusCode::OK, content_type(kind), body, &request_id)
}

/// PUT /{bucket}?<kind>
pub(crate) async fn put_subresource(
    state: &AppState,
    kind: &str,
    bucket: &str,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    debug!("PutBucket {} bucket={} request_id={}", kind, bucket, request_id);

    if let Err(e) = validate_bucket_name(bucket) {
        return error_response(e, &request_id);
    }

    match state.subresources.save(kind, bucket, &body).await {
        Ok(()) => {
            info!("Bucket {} configuration set for {}", kind, bucket);
            empty_response(StatusCode::OK, &request_id)
        }
        Err(e) => {
            error!("Error saving {} configuration for {}: {}", kind, bucket, e);
            error_response(Error::Io(e), &request_id)
        }
    }
}

/// DELETE /{bucket}?<kind>
pub(crate) async fn delete_subresource(state: &AppState, kind: &str, bucket: &str) -> Response {
    let request_id = generate_request_id();
    debug!("DeleteBucket {} bucket={} request_id={}", kind, bucket, request_id);

    if let Err(e) = validate_bucket_name(bucket) {
        return error_response(e, &request_id);
    }

    match state.subresources.delete(kind, bucket).await {
        Ok(_) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => {
            error!("Error deleting {} configuration for {}: {}", kind, bucket, e);
            error_response(Error::Io(e), &request_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn new_store(temp: &TempDir) -> SubresourceStore {
        SubresourceStore::new(StorageConfig {
            data_dir: temp.path().to_path_buf(),
        })
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);

        assert_eq!(store.load("cors", "bucket").await.unwrap(), None);

        store.save("cors", "bucket", b"<CORSConfiguration/>").await.unwrap();
        assert_eq!(store.path("cors", "bucket"), temp.path().join("cors/bucket.xml"));
        assert_eq!(
            store.load("cors", "bucket").await.unwrap(),
            Some(Bytes::from_static(b"<CORSConfiguration/>"))
        );

        assert!(store.delete("cors", "bucket").await.unwrap());
        assert!(!store.delete("cors", "bucket").await.unwrap());
        assert_eq!(store.load("cors", "bucket").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);

        store.save("website", "bucket", b"<WebsiteConfiguration/>").await.unwrap();
        assert_eq!(store.load("logging", "bucket").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(new_store(&temp));

        let documents: Vec<String> = (0..8)
            .map(|i| format!("<Tagging><TagSet><Tag><Key>n</Key><Value>{}</Value></Tag></TagSet></Tagging>", i))
            .collect();
        let mut puts = tokio::task::JoinSet::new();
        for document in documents.clone() {
            let store = store.clone();
            puts.spawn(async move { store.save("tagging", "bucket", document.as_bytes()).await });
        }
        while let Some(saved) = puts.join_next().await {
            saved.unwrap().unwrap();
        }

        let stored = store.load("tagging", "bucket").await.unwrap().unwrap();
        assert!(documents.iter().any(|d| d.as_bytes() == &stored[..]));

        let files: Vec<_> = std::fs::read_dir(temp.path().join("tagging"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("bucket.xml")]);
    }
}
