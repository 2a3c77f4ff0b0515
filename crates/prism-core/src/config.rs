//! Configuration for Prism

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Directory (under the data dir) holding persisted notification configurations
pub const NOTIFICATIONS_DIR: &str = "notifications";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrismConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PrismConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::InternalError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::InternalError(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PRISM_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }
        if let Ok(port) = std::env::var("PRISM_PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }
        if let Ok(dir) = std::env::var("PRISM_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(endpoint) = std::env::var("PRISM_BACKEND_ENDPOINT") {
            config.backend.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("PRISM_BACKEND_ACCESS_KEY") {
            config.backend.access_key = key;
        }
        if let Ok(secret) = std::env::var("PRISM_BACKEND_SECRET_KEY") {
            config.backend.secret_key = secret;
        }
        if let Ok(endpoint) = std::env::var("PRISM_LAMBDA_ENDPOINT") {
            config.notifications.lambda_endpoint = endpoint;
        }
        if let Ok(policy) = std::env::var("PRISM_INTAKE_POLICY") {
            match policy.as_str() {
                "block" => config.notifications.intake_policy = IntakePolicy::Block,
                "drop" => config.notifications.intake_policy = IntakePolicy::Drop,
                _ => {}
            }
        }
        if let Ok(region) = std::env::var("PRISM_REGION") {
            config.aws.region = region;
        }
        if let Ok(account) = std::env::var("PRISM_ACCOUNT_ID") {
            config.aws.account_id = account;
        }
        if let Ok(level) = std::env::var("PRISM_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("PRISM_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.notifications.validate()?;

        if self.backend.endpoint.is_empty() {
            return Err(crate::Error::InvalidArgument(
                "backend endpoint must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

/// Object-storage backend the gateway forwards to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `http://localhost:9001`
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Timeout for a single forwarded request
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9001".to_string(),
            access_key: "minio".to_string(),
            secret_key: "miniosecret".to_string(),
            request_timeout_secs: 300,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for everything the gateway persists
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn notifications_dir(&self) -> PathBuf {
        self.data_dir.join(NOTIFICATIONS_DIR)
    }

    /// Directory for a raw bucket sub-resource such as `cors` or `accelerate`
    pub fn subresource_dir(&self, kind: &str) -> PathBuf {
        self.data_dir.join(kind)
    }
}

/// What `process_event` does when a bucket's intake is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakePolicy {
    /// Wait up to `intake_timeout_ms`, then drop the event
    #[default]
    Drop,
    /// Wait for capacity for as long as it takes
    Block,
}

/// Notification engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Capacity of each bucket's intake channel
    pub intake_capacity: usize,
    pub intake_policy: IntakePolicy,
    /// How long `Drop` waits for capacity before giving up
    pub intake_timeout_ms: u64,
    /// Events queued per target before the target holds back the intake
    pub target_queue_capacity: usize,
    /// Upper bound for a single target invocation
    pub invoke_timeout_secs: u64,
    /// How long shutdown waits for in-flight dispatches
    pub drain_timeout_secs: u64,
    /// Lambda-compatible endpoint that receives function invocations
    pub lambda_endpoint: String,
    pub lambda_access_key: String,
    pub lambda_secret_key: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            intake_capacity: 1024,
            intake_policy: IntakePolicy::Drop,
            intake_timeout_ms: 100,
            target_queue_capacity: 1024,
            invoke_timeout_secs: 30,
            drain_timeout_secs: 5,
            lambda_endpoint: "http://localhost:9050".to_string(),
            lambda_access_key: "ABC".to_string(),
            lambda_secret_key: "EFG".to_string(),
        }
    }
}

impl NotificationsConfig {
    pub fn intake_timeout(&self) -> Duration {
        Duration::from_millis(self.intake_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.intake_capacity == 0 {
            return Err(crate::Error::InvalidArgument(
                "notifications.intake_capacity must be greater than zero".into(),
            ));
        }
        if self.target_queue_capacity == 0 {
            return Err(crate::Error::InvalidArgument(
                "notifications.target_queue_capacity must be greater than zero".into(),
            ));
        }
        if self.invoke_timeout_secs == 0 {
            return Err(crate::Error::InvalidArgument(
                "notifications.invoke_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Values reported in ARNs and event records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    pub account_id: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: crate::DEFAULT_REGION.to_string(),
            account_id: crate::DEFAULT_ACCOUNT_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PrismConfig::from_toml(
            r#"
            [server]
            port = 9100

            [notifications]
            intake_policy = "block"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.notifications.intake_policy, IntakePolicy::Block);
        assert_eq!(config.notifications.intake_capacity, 1024);
        assert_eq!(config.aws.region, crate::DEFAULT_REGION);
    }

    #[test]
    fn test_notifications_dir() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/srv/prism"),
        };
        assert_eq!(
            storage.notifications_dir(),
            PathBuf::from("/srv/prism/notifications")
        );
        assert_eq!(
            storage.subresource_dir("cors"),
            PathBuf::from("/srv/prism/cors")
        );
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = PrismConfig::default();
        assert!(config.validate().is_ok());

        config.notifications.intake_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_invoke_timeout() {
        let mut config = PrismConfig::default();
        config.notifications.invoke_timeout_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invoke_timeout_secs"));
    }
}
