//! Target dispatch
//!
//! Delivers a single event to a single matched target. Failures are logged
//! and counted, never retried and never propagated: one broken target must not
//! affect the others.

use prism_core::types::{NotificationEvent, TargetMatcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::invoker::Invoker;
use crate::metrics::record_dispatch;

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed,
    TimedOut,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Failed => "failed",
            DispatchOutcome::TimedOut => "timed_out",
        }
    }
}

#[derive(Clone)]
pub struct TargetDispatcher {
    invoker: Arc<dyn Invoker>,
    timeout: Duration,
}

impl TargetDispatcher {
    pub fn new(invoker: Arc<dyn Invoker>, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }

    pub async fn dispatch(&self, target: &TargetMatcher, event: &NotificationEvent) -> DispatchOutcome {
        let start = Instant::now();
        let result = tokio::time::timeout(
            self.timeout,
            self.invoker.invoke(&target.id, &target.target, event),
        )
        .await;

        let outcome = match result {
            Ok(Ok(())) => {
                debug!(
                    "Delivered {} for {}/{} to {}",
                    event.event_type, event.bucket, event.key, target.target
                );
                DispatchOutcome::Delivered
            }
            Ok(Err(e)) => {
                warn!(
                    "Failed to deliver {} for {}/{} to {}: {}",
                    event.event_type, event.bucket, event.key, target.target, e
                );
                DispatchOutcome::Failed
            }
            Err(_) => {
                warn!(
                    "Delivery of {} for {}/{} to {} timed out after {:?}",
                    event.event_type, event.bucket, event.key, target.target, self.timeout
                );
                DispatchOutcome::TimedOut
            }
        };

        record_dispatch(&event.bucket, outcome.as_str(), start.elapsed().as_secs_f64());
        outcome
    }
}
