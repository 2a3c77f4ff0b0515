//! On-disk notification configurations
//!
//! One YAML document per bucket, named `<bucket>.yaml`. The bucket is always
//! derived from the file name, never from the document.

use prism_core::types::NotificationConfiguration;
use prism_core::utils::validate_bucket_name;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;

/// Extension of persisted configuration files
pub const CONFIG_EXTENSION: &str = "yaml";

#[derive(Debug, Clone)]
pub struct NotificationStore {
    dir: PathBuf,
}

impl NotificationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn configuration_path(&self, bucket: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", bucket, CONFIG_EXTENSION))
    }

    fn checked_path(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        validate_bucket_name(bucket).map_err(|_| StoreError::InvalidBucket(bucket.to_string()))?;
        Ok(self.configuration_path(bucket))
    }

    /// Persist a configuration, replacing any previous one for the bucket
    pub async fn save(
        &self,
        bucket: &str,
        config: &NotificationConfiguration,
    ) -> Result<PathBuf, StoreError> {
        let path = self.checked_path(bucket)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Dir {
                path: self.dir.clone(),
                source,
            })?;

        let yaml = serde_yaml::to_string(config).map_err(|source| StoreError::Encode {
            bucket: bucket.to_string(),
            source,
        })?;

        // Write then rename so a reader never sees a half-written document.
        // Each writer gets its own temp file.
        let temp_path = self
            .dir
            .join(format!(".{}.{}.{}.tmp", bucket, CONFIG_EXTENSION, Uuid::new_v4().simple()));
        fs::write(&temp_path, yaml)
            .await
            .map_err(|source| StoreError::Save {
                path: temp_path.clone(),
                source,
            })?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|source| StoreError::Save {
                path: path.clone(),
                source,
            })?;

        debug!("Saved notification configuration for {} to {}", bucket, path.display());
        Ok(path)
    }

    /// Load the configuration saved for a bucket, if any
    pub async fn load(&self, bucket: &str) -> Result<Option<NotificationConfiguration>, StoreError> {
        let path = self.checked_path(bucket)?;
        match fs::read_to_string(&path).await {
            Ok(content) => decode(&path, &content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Load { path, source }),
        }
    }

    /// Load a single configuration file, returning the bucket it belongs to
    pub async fn load_path(
        &self,
        path: &Path,
    ) -> Result<(String, NotificationConfiguration), StoreError> {
        let bucket = bucket_from_path(path).ok_or_else(|| StoreError::Load {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "file name does not name a bucket",
            ),
        })?;

        let content = fs::read_to_string(path)
            .await
            .map_err(|source| StoreError::Load {
                path: path.to_path_buf(),
                source,
            })?;

        Ok((bucket, decode(path, &content)?))
    }

    /// Load every persisted configuration, ordered by bucket name.
    ///
    /// A missing directory means nothing was ever saved. Files without the
    /// `.yaml` extension are ignored. The first unreadable or undecodable file
    /// aborts the whole load.
    pub async fn load_all(&self) -> Result<Vec<(String, NotificationConfiguration)>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Notification directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Dir {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut paths = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| StoreError::Dir {
                path: self.dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            let is_config = path.extension().and_then(|e| e.to_str()) == Some(CONFIG_EXTENSION);
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);

            if is_config && is_file {
                paths.push(path);
            } else {
                debug!("Skipping {}", path.display());
            }
        }
        paths.sort();

        let mut configs = Vec::with_capacity(paths.len());
        for path in paths {
            configs.push(self.load_path(&path).await?);
        }

        info!(
            "Loaded {} notification configuration(s) from {}",
            configs.len(),
            self.dir.display()
        );
        Ok(configs)
    }

    /// Remove a bucket's configuration. Returns whether one existed.
    pub async fn delete(&self, bucket: &str) -> Result<bool, StoreError> {
        let path = self.checked_path(bucket)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Save { path, source }),
        }
    }
}

fn bucket_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

fn decode(path: &Path, content: &str) -> Result<NotificationConfiguration, StoreError> {
    serde_yaml::from_str(content).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::types::{CloudFunctionConfiguration, S3KeyFilter, OBJECT_CREATED_ALL, OBJECT_REMOVED_ALL};
    use tempfile::TempDir;

    fn sample_config() -> NotificationConfiguration {
        NotificationConfiguration::new().add_cloud_function(
            CloudFunctionConfiguration::new(
                "tf-s3-lambda-20220407133353589300000001",
                "arn:aws:lambda:us-west-2:271828182845:function:myaws-copy-file",
            )
            .with_event(OBJECT_REMOVED_ALL)
            .with_event(OBJECT_CREATED_ALL)
            .with_filter(S3KeyFilter::prefix("AWSLogs/").with_suffix(".log")),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = NotificationStore::new(temp.path().join("notifications"));
        let config = sample_config();

        let path = store.save("logs-bucket", &config).await.unwrap();
        assert_eq!(path, temp.path().join("notifications/logs-bucket.yaml"));

        let loaded = store.load("logs-bucket").await.unwrap();
        assert_eq!(loaded, Some(config.clone()));

        let (bucket, from_path) = store.load_path(&path).await.unwrap();
        assert_eq!(bucket, "logs-bucket");
        assert_eq!(from_path, config);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = NotificationStore::new(temp.path());

        store.save("bucket", &sample_config()).await.unwrap();
        let replacement = NotificationConfiguration::new()
            .add_cloud_function(CloudFunctionConfiguration::new("other", "fn").with_event(OBJECT_CREATED_ALL));
        store.save("bucket", &replacement).await.unwrap();

        assert_eq!(store.load("bucket").await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let temp = TempDir::new().unwrap();
        let store = NotificationStore::new(temp.path());

        assert_eq!(store.load("nothing").await.unwrap(), None);
        assert!(!store.delete("nothing").await.unwrap());
    }

    #[tokio::test]
    async fn test_load_all_missing_dir() {
        let temp = TempDir::new().unwrap();
        let store = NotificationStore::new(temp.path().join("absent"));

        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_all_skips_other_files() {
        let temp = TempDir::new().unwrap();
        let store = NotificationStore::new(temp.path());

        store.save("bravo", &sample_config()).await.unwrap();
        store.save("alpha", &sample_config()).await.unwrap();
        std::fs::write(temp.path().join("README.txt"), "not a config").unwrap();
        std::fs::write(temp.path().join("charlie.yaml.bak"), "::: nope").unwrap();
        std::fs::create_dir(temp.path().join("nested.yaml")).unwrap();

        let loaded = store.load_all().await.unwrap();
        let buckets: Vec<&str> = loaded.iter().map(|(b, _)| b.as_str()).collect();
        assert_eq!(buckets, vec!["alpha", "bravo"]);
    }

    #[tokio::test]
    async fn test_load_all_fails_on_malformed_file() {
        let temp = TempDir::new().unwrap();
        let store = NotificationStore::new(temp.path());

        store.save("good", &sample_config()).await.unwrap();
        std::fs::write(temp.path().join("broken.yaml"), "CloudFunctionConfigurations: [").unwrap();

        let err = store.load_all().await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_rejects_unsafe_bucket_names() {
        let temp = TempDir::new().unwrap();
        let store = NotificationStore::new(temp.path());

        let err = store.save("../escape", &sample_config()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidBucket(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp = TempDir::new().unwrap();
        let store = NotificationStore::new(temp.path());

        store.save("bucket", &sample_config()).await.unwrap();
        assert!(store.delete("bucket").await.unwrap());
        assert_eq!(store.load("bucket").await.unwrap(), None);
    }
}
