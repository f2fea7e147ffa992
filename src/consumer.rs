//! The single consumer worker.
//!
//! Drains the queue on a dedicated thread, dispatches each event through the
//! registry and records its queueing latency.
//!
//! Lifecycle is `Running -> ShuttingDown -> Stopped`. On shutdown the worker
//! keeps delivering pending CRITICAL events until the grace period runs out,
//! then discards whatever is left.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{BusError, BusResult};
use crate::event::Event;
use crate::metrics::{BusCounters, LatencyTracker};
use crate::queue::{duration_ms, PriorityEventQueue};
use crate::registry::CallbackRegistry;

/// Extra time allowed past the grace period for a handler already in flight.
const JOIN_MARGIN: Duration = Duration::from_secs(1);

/// Consumer lifecycle state.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    Running = 0,
    ShuttingDown = 1,
    Stopped = 2,
}

impl ConsumerState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

struct Worker {
    queue: Arc<PriorityEventQueue>,
    registry: Arc<CallbackRegistry>,
    tracker: Arc<LatencyTracker>,
    counters: Arc<BusCounters>,
    state: Arc<AtomicU8>,
    grace: Duration,
}

impl Worker {
    fn run(self) {
        while let Some(event) = self.queue.take() {
            self.process(&event);
        }

        self.state.store(ConsumerState::ShuttingDown as u8, Ordering::Release);
        let deadline = Instant::now() + self.grace;
        let mut drained = 0usize;
        while Instant::now() < deadline {
            let Some(event) = self.queue.pop_critical() else {
                break;
            };
            self.process(&event);
            drained += 1;
        }

        let discarded = self.queue.discard_remaining();
        self.counters.record_discarded(discarded);
        if discarded > 0 {
            warn!(discarded, drained, "pending events discarded at shutdown");
        }

        self.state.store(ConsumerState::Stopped as u8, Ordering::Release);
        debug!(drained, "event consumer stopped");
    }

    fn process(&self, event: &Event) {
        let latency = event.age();
        let report = self.registry.dispatch(event);
        self.tracker.record(latency);
        self.counters.record_dispatch(report.failed);
    }
}

/// Handle to the running consumer thread.
#[derive(Debug)]
pub struct EventConsumer {
    queue: Arc<PriorityEventQueue>,
    state: Arc<AtomicU8>,
    done_rx: Receiver<()>,
    join: Mutex<Option<JoinHandle<()>>>,
    grace: Duration,
}

impl EventConsumer {
    /// Spawns the consumer thread.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Spawn` if the OS refuses to create the thread.
    pub fn start(
        queue: Arc<PriorityEventQueue>,
        registry: Arc<CallbackRegistry>,
        tracker: Arc<LatencyTracker>,
        counters: Arc<BusCounters>,
        grace: Duration,
    ) -> BusResult<Self> {
        let state = Arc::new(AtomicU8::new(ConsumerState::Running as u8));
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker = Worker {
            queue: Arc::clone(&queue),
            registry,
            tracker,
            counters,
            state: Arc::clone(&state),
            grace,
        };
        let join = thread::Builder::new()
            .name("posture-bus-consumer".to_string())
            .spawn(move || {
                worker.run();
                let _ = done_tx.send(());
            })
            .map_err(|source| BusError::Spawn {
                thread: "consumer",
                source,
            })?;

        info!(capacity = queue.capacity(), "event consumer started");
        Ok(Self {
            queue,
            state,
            done_rx,
            join: Mutex::new(Some(join)),
            grace,
        })
    }

    #[must_use]
    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Stops the consumer and waits for it to exit. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `BusError::ShutdownTimeout` if a handler keeps the thread busy
    /// past the grace period plus a margin; the thread is then detached.
    pub fn shutdown(&self) -> BusResult<()> {
        let mut join = self.join.lock();
        let Some(handle) = join.take() else {
            return Ok(());
        };

        self.queue.close();
        let wait = self.grace + JOIN_MARGIN;
        match self.done_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                // The worker has finished or died; join cannot block for long.
                let _ = handle.join();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = duration_ms(wait);
                warn!(timeout_ms, "event consumer did not stop in time, detaching");
                Err(BusError::ShutdownTimeout { timeout_ms })
            }
        }
    }
}

impl Drop for EventConsumer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
