//! # posture-bus - local event bus for posture monitoring clients
//!
//! posture-bus couples the detection thread, the tray/UI thread, tooltip
//! pollers and notification dispatchers of a desktop monitoring client
//! through an in-process bus with a hard latency budget.
//!
//! ## Core Concepts
//!
//! - **PriorityEventQueue**: bounded, priority-ordered, multi-producer queue with a drop policy
//! - **CallbackRegistry**: per-kind handler table with copy-on-read dispatch and failure isolation
//! - **SharedStateStore**: timeout-bounded shared state plus a TTL cache of derived statistics
//! - **EventConsumer**: the single worker draining the queue and measuring latency
//! - **LatencyTracker**: ring buffer of recent latencies with percentile queries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use posture_bus::{BusConfig, EventBus, EventKind, EventKindTag, PostureState};
//!
//! let bus = EventBus::new(BusConfig::default())?;
//! bus.register_fn(EventKindTag::PostureAlert, |event| {
//!     toast.show(event.kind());
//!     Ok(())
//! });
//!
//! bus.update(|s| s.posture_state = PostureState::Bad)?;
//! bus.publish(EventKind::PostureAlert { duration_secs: 600 })?;
//! println!("{}", bus.status_summary()?.tooltip);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod state;

// Re-export primary types at crate root for convenience
pub use bus::EventBus;
pub use config::BusConfig;
pub use consumer::{ConsumerState, EventConsumer};
pub use error::{BusError, BusResult, DropReason, HandlerError, LockTimeout, ValidationError};
pub use event::{ConnectionState, Event, EventKind, EventKindTag, Priority};
pub use metrics::{BusCounters, LatencySummary, LatencyTracker, MetricsSnapshot, PriorityCounts};
pub use queue::PriorityEventQueue;
pub use registry::{
    CallbackHandle, CallbackId, CallbackRegistry, DispatchReport, EventHandler, ForwardingHandler,
};
pub use state::{
    FieldSet, PostureState, SharedState, SharedStateStore, StatKey, StateField, StatusSummary,
};
