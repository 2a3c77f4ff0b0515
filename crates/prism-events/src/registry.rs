//! Bucket subscriptions
//!
//! Each bucket with a configuration gets:
//! - a bounded intake channel that `process_event` feeds
//! - a pump task offering every event to each target whose filter matches
//! - one bounded queue and task per target, dispatching in arrival order
//!
//! Targets dispatch independently until one of them has
//! `target_queue_capacity` events waiting. The pump then waits for that
//! target, the intake fills up and the intake policy decides whether
//! `process_event` waits or drops.

use parking_lot::{Mutex, RwLock};
use prism_core::config::{IntakePolicy, NotificationsConfig};
use prism_core::types::{NotificationConfiguration, NotificationEvent, TargetMatcher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::dispatcher::TargetDispatcher;
use crate::error::{NotifyError, NotifyResult};
use crate::invoker::Invoker;
use crate::metrics::{record_dropped, record_received, set_active_subscriptions, DropReason};
use crate::store::NotificationStore;

/// Tasks serving one subscription
struct Workers {
    bucket: String,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl Workers {
    fn is_finished(&mut self) -> bool {
        while self.tasks.try_join_next().is_some() {}
        self.tasks.is_empty()
    }
}

struct BucketSubscription {
    config: NotificationConfiguration,
    intake: mpsc::Sender<NotificationEvent>,
    workers: Workers,
}

/// Registry of bucket subscriptions
pub struct NotificationService {
    store: NotificationStore,
    dispatcher: TargetDispatcher,
    settings: NotificationsConfig,
    subscriptions: RwLock<HashMap<String, BucketSubscription>>,
    /// Replaced or stopped subscriptions still draining their queues
    retired: Mutex<Vec<Workers>>,
    /// Held while a configuration is persisted and attached, so the file on
    /// disk and the live subscription always come from the same write
    writes: tokio::sync::Mutex<()>,
    span: Span,
}

impl NotificationService {
    pub fn new(
        store: NotificationStore,
        invoker: Arc<dyn Invoker>,
        settings: NotificationsConfig,
    ) -> Self {
        let dispatcher = TargetDispatcher::new(invoker, settings.invoke_timeout());
        Self {
            store,
            dispatcher,
            settings,
            subscriptions: RwLock::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            writes: tokio::sync::Mutex::new(()),
            span: info_span!("notifications"),
        }
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Register every persisted configuration. Any failure aborts the load.
    pub async fn load_all(&self) -> NotifyResult<usize> {
        let configs = self.store.load_all().await?;
        let count = configs.len();

        for (bucket, config) in configs {
            self.start(&bucket, config)?;
        }

        Ok(count)
    }

    /// Register the configuration stored in one file, returning its bucket
    pub async fn load(&self, path: &Path) -> NotifyResult<String> {
        let (bucket, config) = self.store.load_path(path).await?;
        self.start(&bucket, config)?;
        Ok(bucket)
    }

    /// Attach a configuration to a bucket, replacing any existing one.
    ///
    /// Events already queued for a replaced configuration are still delivered
    /// under that configuration.
    pub fn start(&self, bucket: &str, config: NotificationConfiguration) -> NotifyResult<()> {
        let targets = config.compile()?;
        let target_count = targets.len();
        let subscription = self.spawn_subscription(bucket, config, targets);

        let (previous, active) = {
            let mut subscriptions = self.subscriptions.write();
            let previous = subscriptions.insert(bucket.to_string(), subscription);
            (previous, subscriptions.len())
        };
        set_active_subscriptions(active);

        let _enter = self.span.enter();
        match previous {
            Some(previous) => {
                info!("Replaced notification configuration for {} ({} targets)", bucket, target_count);
                self.retire(previous);
            }
            None => {
                info!("Started notifications for {} ({} targets)", bucket, target_count);
            }
        }
        Ok(())
    }

    /// Validate, persist and attach a configuration
    pub async fn save(&self, bucket: &str, config: NotificationConfiguration) -> NotifyResult<()> {
        config.compile()?;
        let _writing = self.writes.lock().await;
        self.store.save(bucket, &config).await?;
        self.start(bucket, config)
    }

    /// Detach a bucket's configuration and delete its file.
    /// Returns whether anything existed.
    pub async fn remove(&self, bucket: &str) -> NotifyResult<bool> {
        let _writing = self.writes.lock().await;
        let stopped = self.stop(bucket);
        let deleted = self.store.delete(bucket).await?;
        Ok(stopped || deleted)
    }

    /// Detach a bucket's configuration. Queued events are still delivered.
    pub fn stop(&self, bucket: &str) -> bool {
        let (removed, active) = {
            let mut subscriptions = self.subscriptions.write();
            let removed = subscriptions.remove(bucket);
            (removed, subscriptions.len())
        };

        match removed {
            Some(subscription) => {
                set_active_subscriptions(active);
                let _enter = self.span.enter();
                info!("Stopped notifications for {}", bucket);
                self.retire(subscription);
                true
            }
            None => false,
        }
    }

    /// Current configuration of a bucket
    pub fn configuration(&self, bucket: &str) -> Option<NotificationConfiguration> {
        self.subscriptions
            .read()
            .get(bucket)
            .map(|subscription| subscription.config.clone())
    }

    pub fn is_registered(&self, bucket: &str) -> bool {
        self.subscriptions.read().contains_key(bucket)
    }

    /// Buckets with an active subscription, sorted
    pub fn buckets(&self) -> Vec<String> {
        let mut buckets: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        buckets.sort();
        buckets
    }

    /// Queue an event for the bucket's targets.
    ///
    /// Returns once the event is accepted, not once it is delivered.
    pub async fn process_event(&self, event: NotificationEvent) -> NotifyResult<()> {
        let bucket = event.bucket.clone();
        let intake = self
            .subscriptions
            .read()
            .get(&bucket)
            .map(|subscription| subscription.intake.clone());

        let Some(intake) = intake else {
            return Err(NotifyError::NotRegistered { bucket });
        };

        record_received(&bucket);

        let result = match self.settings.intake_policy {
            IntakePolicy::Drop => intake
                .send_timeout(event, self.settings.intake_timeout())
                .await
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => DropReason::IntakeFull,
                    SendTimeoutError::Closed(_) => DropReason::IntakeClosed,
                }),
            IntakePolicy::Block => intake
                .send(event)
                .await
                .map_err(|_| DropReason::IntakeClosed),
        };

        result.map_err(|reason| {
            record_dropped(&bucket, reason);
            warn!(parent: &self.span, "Dropped event for {}: {}", bucket, reason.as_str());
            match reason {
                DropReason::IntakeFull => NotifyError::IntakeFull { bucket },
                _ => NotifyError::IntakeClosed { bucket },
            }
        })
    }

    /// Stop every subscription.
    ///
    /// Intakes are closed first and queued events get up to `drain_timeout` to
    /// be delivered. Whatever is still running after that is cancelled.
    pub async fn shutdown(&self) {
        self.drain().instrument(self.span.clone()).await
    }

    async fn drain(&self) {
        let subscriptions: Vec<BucketSubscription> = self
            .subscriptions
            .write()
            .drain()
            .map(|(_, subscription)| subscription)
            .collect();
        set_active_subscriptions(0);

        let mut workers = std::mem::take(&mut *self.retired.lock());
        workers.extend(subscriptions.into_iter().map(|subscription| subscription.workers));

        info!("Draining {} notification subscription(s)", workers.len());

        let deadline = Instant::now() + self.settings.drain_timeout();
        let mut drained = true;
        'drain: for worker in workers.iter_mut() {
            while !worker.tasks.is_empty() {
                if tokio::time::timeout_at(deadline, worker.tasks.join_next())
                    .await
                    .is_err()
                {
                    drained = false;
                    break 'drain;
                }
            }
        }

        if !drained {
            let pending: Vec<String> = workers
                .iter_mut()
                .filter_map(|worker| (!worker.is_finished()).then(|| worker.bucket.clone()))
                .collect();
            warn!(
                "Drain timeout reached, cancelling pending deliveries for {:?}",
                pending
            );
            for worker in &workers {
                worker.cancel.cancel();
            }
            for worker in workers.iter_mut() {
                while worker.tasks.join_next().await.is_some() {}
            }
        }

        info!("Notification service stopped");
    }

    fn spawn_subscription(
        &self,
        bucket: &str,
        config: NotificationConfiguration,
        targets: Vec<TargetMatcher>,
    ) -> BucketSubscription {
        let span = info_span!(parent: &self.span, "subscription", bucket = %bucket);
        let (intake_tx, intake_rx) = mpsc::channel(self.settings.intake_capacity);
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut queues = Vec::with_capacity(targets.len());

        for target in targets {
            let target = Arc::new(target);
            let (queue_tx, queue_rx) = mpsc::channel(self.settings.target_queue_capacity);
            let target_span = info_span!(
                parent: &span,
                "target",
                id = %target.id,
                function = %target.target
            );
            tasks.spawn(
                run_target(target.clone(), queue_rx, self.dispatcher.clone(), cancel.clone())
                    .instrument(target_span),
            );
            queues.push(TargetQueue {
                target,
                queue: queue_tx,
            });
        }
        tasks.spawn(run_pump(intake_rx, queues, cancel.clone()).instrument(span));

        BucketSubscription {
            config,
            intake: intake_tx,
            workers: Workers {
                bucket: bucket.to_string(),
                cancel,
                tasks,
            },
        }
    }

    fn retire(&self, subscription: BucketSubscription) {
        // Dropping the intake sender lets the tasks finish once the queue is empty
        let BucketSubscription { workers, .. } = subscription;
        let mut retired = self.retired.lock();
        retired.retain_mut(|worker| !worker.is_finished());
        retired.push(workers);
    }
}

/// A target as seen by the pump
struct TargetQueue {
    target: Arc<TargetMatcher>,
    queue: mpsc::Sender<Arc<NotificationEvent>>,
}

async fn run_pump(
    mut intake: mpsc::Receiver<NotificationEvent>,
    queues: Vec<TargetQueue>,
    cancel: CancellationToken,
) {
    'pump: loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = intake.recv() => match event {
                Some(event) => Arc::new(event),
                None => break,
            },
        };

        for target in queues.iter().filter(|target| target.target.matches(&event)) {
            // Waits while the target's queue is full
            let queued = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                sent = target.queue.send(event.clone()) => Some(sent.is_ok()),
            };
            match queued {
                None => break 'pump,
                Some(false) => debug!("Target {} is gone, event not queued", target.target.id),
                Some(true) => {}
            }
        }
    }

    debug!("Intake closed");
}

async fn run_target(
    target: Arc<TargetMatcher>,
    mut queue: mpsc::Receiver<Arc<NotificationEvent>>,
    dispatcher: TargetDispatcher,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = queue.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = dispatcher.dispatch(&target, &event) => {}
        }
    }

    debug!("Target stopped");
}
