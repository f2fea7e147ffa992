//! The event bus facade.
//!
//! An `EventBus` is constructed once at process start and injected into every
//! producer and consumer component; there is no global instance. Collaborators
//! that only need one capability can hold the matching `Arc` handle instead.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::BusConfig;
use crate::consumer::{ConsumerState, EventConsumer};
use crate::error::{BusResult, DropReason, HandlerError, LockTimeout};
use crate::event::{Event, EventKind, EventKindTag};
use crate::metrics::{BusCounters, LatencyTracker, MetricsSnapshot};
use crate::queue::PriorityEventQueue;
use crate::registry::{CallbackHandle, CallbackRegistry, EventHandler};
use crate::state::{FieldSet, SharedState, SharedStateStore, StatKey, StatusSummary};

/// Priority queue, callback registry, shared state and consumer, wired together.
///
/// ```
/// use posture_bus::{BusConfig, Event, EventBus, EventKind, EventKindTag};
///
/// let bus = EventBus::new(BusConfig::default()).unwrap();
/// bus.register_fn(EventKindTag::PostureAlert, |event: &Event| {
///     println!("alert after {:?}", event.kind());
///     Ok(())
/// });
/// bus.publish(EventKind::PostureAlert { duration_secs: 600 }).unwrap();
/// bus.shutdown().unwrap();
/// ```
#[derive(Debug)]
pub struct EventBus {
    config: BusConfig,
    queue: Arc<PriorityEventQueue>,
    registry: Arc<CallbackRegistry>,
    store: Arc<SharedStateStore>,
    tracker: Arc<LatencyTracker>,
    counters: Arc<BusCounters>,
    consumer: EventConsumer,
}

impl EventBus {
    /// Validates `config` and starts the consumer thread.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Validation` for an unusable config and
    /// `BusError::Spawn` if the consumer thread cannot be created.
    pub fn new(config: BusConfig) -> BusResult<Self> {
        Self::with_state(config, SharedState::default())
    }

    /// Like [`new`](Self::new) but seeds the shared state.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_state(config: BusConfig, initial: SharedState) -> BusResult<Self> {
        config.validate()?;

        let queue = Arc::new(PriorityEventQueue::new(
            config.queue_capacity,
            config.critical_block_timeout(),
        ));
        let registry = Arc::new(CallbackRegistry::new());
        let store = Arc::new(SharedStateStore::with_state(
            initial,
            config.lock_timeout(),
            config.stats_cache_ttl(),
        ));
        let tracker = Arc::new(LatencyTracker::new(
            config.latency_sample_window,
            config.latency_warn_threshold(),
        ));
        let counters = Arc::new(BusCounters::default());

        let consumer = EventConsumer::start(
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&tracker),
            Arc::clone(&counters),
            config.shutdown_grace(),
        )?;

        Ok(Self {
            config,
            queue,
            registry,
            store,
            tracker,
            counters,
            consumer,
        })
    }

    /// Producer API.
    ///
    /// # Errors
    ///
    /// Returns the [`DropReason`] when the event was not enqueued.
    pub fn submit(&self, event: Event) -> Result<(), DropReason> {
        self.queue.submit(event)
    }

    /// Submits `kind` with its default priority.
    ///
    /// # Errors
    ///
    /// Returns the [`DropReason`] when the event was not enqueued.
    pub fn publish(&self, kind: EventKind) -> Result<(), DropReason> {
        self.submit(Event::new(kind))
    }

    /// Registers a handler; it runs on the consumer thread.
    pub fn register<H>(&self, tag: EventKindTag, handler: H) -> CallbackHandle
    where
        H: EventHandler + 'static,
    {
        self.registry.register(tag, handler)
    }

    /// Registers a closure handler.
    pub fn register_fn<F>(&self, tag: EventKindTag, f: F) -> CallbackHandle
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.registry.register_fn(tag, f)
    }

    /// Returns false if the handle was already unregistered.
    pub fn unregister(&self, handle: &CallbackHandle) -> bool {
        self.registry.unregister(handle)
    }

    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the state lock is contended past the timeout.
    pub fn get_snapshot(&self) -> Result<SharedState, LockTimeout> {
        self.store.get_snapshot()
    }

    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the state lock is contended past the timeout.
    pub fn update<F>(&self, mutator: F) -> Result<FieldSet, LockTimeout>
    where
        F: FnOnce(&mut SharedState),
    {
        self.store.update(mutator)
    }

    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the state lock is contended past the timeout.
    pub fn get_cached_stat<T, F>(
        &self,
        key: &StatKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, LockTimeout>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&SharedState) -> T,
    {
        self.store.get_cached_stat(key, ttl, compute)
    }

    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the state lock is contended past the timeout.
    pub fn status_summary(&self) -> Result<StatusSummary, LockTimeout> {
        self.store.status_summary()
    }

    /// Read-only metrics for the tray UI, logs or a status endpoint.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            depth_by_priority: self.queue.depth_by_priority(),
            drops: self.queue.drops(),
            submitted: self.queue.submitted(),
            dispatched: self.counters.dispatched(),
            callback_failures: self.counters.callback_failures(),
            discarded_on_shutdown: self.counters.discarded_on_shutdown(),
            slow_dispatches: self.tracker.slow_samples(),
            latency: self.tracker.summary(),
        }
    }

    #[must_use]
    pub fn consumer_state(&self) -> ConsumerState {
        self.consumer.state()
    }

    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    #[must_use]
    pub fn queue(&self) -> Arc<PriorityEventQueue> {
        Arc::clone(&self.queue)
    }

    #[must_use]
    pub fn registry(&self) -> Arc<CallbackRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn store(&self) -> Arc<SharedStateStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn latency(&self) -> Arc<LatencyTracker> {
        Arc::clone(&self.tracker)
    }

    /// Stops accepting events, drains CRITICAL ones and joins the consumer.
    ///
    /// # Errors
    ///
    /// Returns `BusError::ShutdownTimeout` if a handler keeps the consumer busy.
    pub fn shutdown(&self) -> BusResult<()> {
        let result = self.consumer.shutdown();
        match &result {
            Ok(()) => {
                let m = self.metrics();
                info!(
                    dispatched = m.dispatched,
                    dropped = m.drops.total(),
                    discarded = m.discarded_on_shutdown,
                    "event bus stopped"
                );
            }
            Err(err) => error!(error = %err, "event bus shutdown incomplete"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::error::BusError;

    #[test]
    fn invalid_config_is_rejected() {
        let err = EventBus::new(BusConfig {
            latency_sample_window: 0,
            ..BusConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, BusError::Validation(_)));
    }

    #[test]
    fn metrics_start_empty() {
        let bus = EventBus::new(BusConfig::default()).unwrap();
        let m = bus.metrics();
        assert_eq!(m.queue_capacity, 100);
        assert_eq!(m.queue_depth, 0);
        assert_eq!(m.drops.total(), 0);
        assert!(!m.is_degraded());
        bus.shutdown().unwrap();
        assert_eq!(bus.consumer_state(), ConsumerState::Stopped);
    }

    #[test]
    fn publish_after_shutdown_is_rejected() {
        let bus = EventBus::new(BusConfig::default()).unwrap();
        bus.shutdown().unwrap();
        assert_eq!(
            bus.publish(EventKind::MonitoringStatus { active: true }),
            Err(DropReason::ShuttingDown)
        );
    }

    #[test]
    fn state_waiter_is_bounded_by_lock_timeout_during_shutdown() {
        let bus = EventBus::new(BusConfig {
            lock_timeout_ms: 20,
            ..BusConfig::default()
        })
        .unwrap();
        let store = bus.store();

        let holder = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store
                    .update(|_| thread::sleep(Duration::from_millis(200)))
                    .unwrap();
            })
        };
        thread::sleep(Duration::from_millis(20));

        let waiter = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let started = Instant::now();
                (store.get_snapshot(), started.elapsed())
            })
        };
        bus.shutdown().unwrap();

        let (result, waited) = waiter.join().unwrap();
        assert_eq!(result.unwrap_err().timeout_ms, 20);
        assert!(waited < Duration::from_millis(150));

        holder.join().unwrap();
        assert!(bus.get_snapshot().is_ok());
    }

    #[test]
    fn seeded_state_is_visible() {
        let bus = EventBus::with_state(
            BusConfig::default(),
            SharedState {
                monitoring_active: true,
                ..SharedState::default()
            },
        )
        .unwrap();
        assert!(bus.get_snapshot().unwrap().monitoring_active);
        assert!(bus.status_summary().unwrap().tooltip.starts_with("Monitoring"));
    }
}
