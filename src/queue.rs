//! Bounded priority queue coupling many producers to the single consumer.
//!
//! One FIFO lane per priority plus a total count, all under one lock. The
//! consumer always takes from the highest non-empty lane, so sustained
//! CRITICAL traffic can starve LOW events.
//!
//! Overflow policy:
//! - CRITICAL waits for room up to the configured timeout, then fails with
//!   [`DropReason::CriticalTimeout`]. While it waits, every slot freed by the
//!   consumer is held for it.
//! - NORMAL/LOW never block. They evict one pending event of equal or lower
//!   priority (lowest priority first, oldest within it), or are rejected with
//!   [`DropReason::QueueFull`] when nothing is evictable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::error::DropReason;
use crate::event::{Event, Priority};
use crate::metrics::PriorityCounts;

#[derive(Debug, Default)]
struct QueueInner {
    lanes: [VecDeque<Event>; 3],
    len: usize,
    next_sequence: u64,
    critical_waiters: usize,
    closed: bool,
}

impl QueueInner {
    fn pop_highest(&mut self) -> Option<Event> {
        let event = self.lanes.iter_mut().find_map(VecDeque::pop_front)?;
        self.len -= 1;
        Some(event)
    }

    fn pop_lane(&mut self, priority: Priority) -> Option<Event> {
        let event = self.lanes[priority.index()].pop_front()?;
        self.len -= 1;
        Some(event)
    }

    /// Full for NORMAL/LOW, counting slots held for waiting CRITICAL submits.
    fn is_full_for(&self, priority: Priority, capacity: usize) -> bool {
        if priority == Priority::Critical {
            self.len >= capacity
        } else {
            self.len + self.critical_waiters >= capacity
        }
    }

    /// Removes the oldest event of the lowest priority not above `incoming`.
    fn evict_for(&mut self, incoming: Priority) -> Option<Event> {
        Priority::DESCENDING
            .iter()
            .rev()
            .copied()
            .filter(|p| *p <= incoming)
            .find_map(|p| self.pop_lane(p))
    }
}

enum Admission {
    Accepted,
    Evicted(Event),
}

/// Thread-safe, bounded, priority-ordered event queue.
#[derive(Debug)]
pub struct PriorityEventQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    critical_block_timeout: Duration,
    drops: [AtomicU64; 3],
    submitted: AtomicU64,
}

impl PriorityEventQueue {
    #[must_use]
    pub fn new(capacity: usize, critical_block_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            critical_block_timeout,
            drops: Default::default(),
            submitted: AtomicU64::new(0),
        }
    }

    /// Enqueues an event, stamping its submit time and sequence number.
    ///
    /// Only CRITICAL submissions can block, and never past the configured
    /// timeout or a call to [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// See the module docs for when each [`DropReason`] is returned.
    pub fn submit(&self, mut event: Event) -> Result<(), DropReason> {
        let enqueue_time = Instant::now();
        let priority = event.priority();

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(DropReason::ShuttingDown);
        }

        let mut admission = Admission::Accepted;
        if inner.is_full_for(priority, self.capacity) {
            if priority == Priority::Critical {
                let deadline = enqueue_time + self.critical_block_timeout;
                inner.critical_waiters += 1;
                while inner.len >= self.capacity && !inner.closed {
                    if self.not_full.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
                inner.critical_waiters -= 1;
                if inner.closed {
                    return Err(DropReason::ShuttingDown);
                }
                if inner.len >= self.capacity {
                    drop(inner);
                    let dropped = self.record_drop(Priority::Critical);
                    let timeout_ms = duration_ms(self.critical_block_timeout);
                    error!(
                        timeout_ms,
                        critical_drops = dropped,
                        kind = %event.tag(),
                        "critical event could not be enqueued before timeout"
                    );
                    return Err(DropReason::CriticalTimeout { timeout_ms });
                }
            } else if let Some(evicted) = inner.evict_for(priority) {
                admission = Admission::Evicted(evicted);
            } else {
                let depth = inner.len;
                drop(inner);
                let dropped = self.record_drop(priority);
                warn!(
                    %priority,
                    kind = %event.tag(),
                    depth,
                    drops = dropped,
                    "queue full, incoming event dropped"
                );
                return Err(DropReason::QueueFull {
                    priority,
                    capacity: self.capacity,
                });
            }
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        event.stamp(enqueue_time, sequence);
        inner.lanes[priority.index()].push_back(event);
        inner.len += 1;
        debug_assert!(inner.len <= self.capacity);
        drop(inner);

        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();

        if let Admission::Evicted(evicted) = admission {
            let dropped = self.record_drop(evicted.priority());
            warn!(
                evicted_priority = %evicted.priority(),
                evicted_sequence = evicted.sequence(),
                kind = %evicted.tag(),
                drops = dropped,
                "queue full, evicted pending event"
            );
        }
        Ok(())
    }

    /// Blocks until an event is available or the queue is closed.
    ///
    /// Returns `None` once the queue is closed, even if events remain; the
    /// consumer drains those explicitly.
    pub fn take(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(event) = inner.pop_highest() {
                drop(inner);
                self.not_full.notify_one();
                return Some(event);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Like [`take`](Self::take) but gives up after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(event) = inner.pop_highest() {
                drop(inner);
                self.not_full.notify_one();
                return Some(event);
            }
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                let event = inner.pop_highest();
                drop(inner);
                if event.is_some() {
                    self.not_full.notify_one();
                }
                return event;
            }
        }
    }

    /// Non-blocking pop of the oldest CRITICAL event. Works after close.
    pub fn pop_critical(&self) -> Option<Event> {
        let event = self.inner.lock().pop_lane(Priority::Critical);
        if event.is_some() {
            self.not_full.notify_one();
        }
        event
    }

    /// Drops every pending event and returns how many were discarded.
    pub fn discard_remaining(&self) -> usize {
        let mut inner = self.inner.lock();
        let discarded = inner.len;
        for lane in &mut inner.lanes {
            lane.clear();
        }
        inner.len = 0;
        drop(inner);
        self.not_full.notify_all();
        discarded
    }

    /// Signals shutdown and wakes every blocked `take` and `submit`.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        debug!(pending = inner.len, "event queue closed");
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn depth_by_priority(&self) -> PriorityCounts {
        let inner = self.inner.lock();
        PriorityCounts::from_fn(|p| inner.lanes[p.index()].len() as u64)
    }

    /// Drop counts per priority, evictions included.
    #[must_use]
    pub fn drops(&self) -> PriorityCounts {
        PriorityCounts::from_fn(|p| self.drops[p.index()].load(Ordering::Relaxed))
    }

    /// Number of events accepted so far.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    fn record_drop(&self, priority: Priority) -> u64 {
        self.drops[priority.index()].fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
