//! Prism Core Library
//!
//! Core types, configuration and utilities shared by the Prism gateway and its
//! notification engine.

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::PrismConfig;
pub use error::{ConfigurationError, Error, Result};

/// Prism version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default S3 region
pub const DEFAULT_REGION: &str = "us-west-2";

/// Default account number used when building ARNs
pub const DEFAULT_ACCOUNT_ID: &str = "271828182845";

/// Maximum bucket name length
pub const MAX_BUCKET_NAME_LENGTH: usize = 63;

/// Minimum bucket name length
pub const MIN_BUCKET_NAME_LENGTH: usize = 3;

/// Sentinel object size reported when the stored object cannot be inspected
pub const UNKNOWN_OBJECT_SIZE: i64 = -1;
