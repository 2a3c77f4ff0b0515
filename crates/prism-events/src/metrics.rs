//! Notification engine metrics

use metrics::{counter, gauge, histogram};

/// Metric names
pub mod names {
    pub const NOTIFICATIONS_RECEIVED_TOTAL: &str = "prism_notifications_received_total";
    pub const NOTIFICATIONS_DROPPED_TOTAL: &str = "prism_notifications_dropped_total";
    pub const NOTIFICATIONS_DISPATCHED_TOTAL: &str = "prism_notifications_dispatched_total";
    pub const NOTIFICATION_INVOKE_DURATION_SECONDS: &str =
        "prism_notification_invoke_duration_seconds";
    pub const SUBSCRIPTIONS_ACTIVE: &str = "prism_subscriptions_active";
}

/// Why an event never reached a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    IntakeFull,
    IntakeClosed,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::IntakeFull => "intake_full",
            DropReason::IntakeClosed => "intake_closed",
        }
    }
}

pub(crate) fn record_received(bucket: &str) {
    counter!(names::NOTIFICATIONS_RECEIVED_TOTAL, "bucket" => bucket.to_string()).increment(1);
}

pub(crate) fn record_dropped(bucket: &str, reason: DropReason) {
    counter!(
        names::NOTIFICATIONS_DROPPED_TOTAL,
        "bucket" => bucket.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

pub(crate) fn record_dispatch(bucket: &str, outcome: &'static str, duration_secs: f64) {
    counter!(
        names::NOTIFICATIONS_DISPATCHED_TOTAL,
        "bucket" => bucket.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(names::NOTIFICATION_INVOKE_DURATION_SECONDS).record(duration_secs);
}

pub(crate) fn set_active_subscriptions(count: usize) {
    gauge!(names::SUBSCRIPTIONS_ACTIVE).set(count as f64);
}
