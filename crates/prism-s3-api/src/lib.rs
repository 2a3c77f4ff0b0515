//! S3 gateway for Prism
//!
//! Forwards S3 traffic to a backend, serves bucket notification and
//! sub-resource configuration itself, and turns completed object writes and
//! deletes into notification events.

pub mod backend;
pub mod events;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod xml;

pub use backend::BackendClient;
pub use metrics::MetricsRecorder;
pub use server::{create_router, AppState, S3Server};
