//! Prism notification engine
//!
//! Keeps one subscription per bucket with a notification configuration. Object
//! events handed to [`NotificationService::process_event`] are queued on the
//! bucket's intake, fanned out to one task per configured target, filtered by
//! event type and key, and delivered through an [`Invoker`].
//!
//! Configurations are persisted as YAML by [`NotificationStore`] and reloaded
//! on startup.

pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod metrics;
pub mod registry;
pub mod store;

pub use dispatcher::{DispatchOutcome, TargetDispatcher};
pub use error::{InvokeError, NotifyError, NotifyResult, StoreError};
pub use invoker::{Destination, HttpInvoker, Invoker};
pub use registry::NotificationService;
pub use store::NotificationStore;
