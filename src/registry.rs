//! Callback registry and dispatch.
//!
//! Handlers are stored per [`EventKindTag`] as an immutable `Arc<[CallbackEntry]>`.
//! Registration replaces the slice; dispatch clones the `Arc` and iterates a
//! snapshot, so `register`/`unregister` never wait on a running handler.
//!
//! Within one snapshot handlers run in registration order. Handlers registered
//! concurrently with a dispatch may or may not see that event.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::HandlerError;
use crate::event::{Event, EventKindTag};

/// Capability implemented by everything that reacts to bus events.
///
/// Handlers run on the consumer thread and must return within a few
/// milliseconds; slow work belongs on the handler's own worker
/// (see [`ForwardingHandler`]).
pub trait EventHandler: Send + Sync {
    /// Reacts to one event.
    ///
    /// # Errors
    ///
    /// Any error is logged and counted by the registry; it never reaches the consumer loop.
    fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Unique identifier for a registered callback.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(Uuid);

impl CallbackId {
    /// Create a new random callback id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallbackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returned by `register`; pass it back to `unregister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle {
    id: CallbackId,
    tag: EventKindTag,
}

impl CallbackHandle {
    #[must_use]
    pub const fn id(&self) -> CallbackId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> EventKindTag {
        self.tag
    }
}

#[derive(Clone)]
struct CallbackEntry {
    id: CallbackId,
    handler: Arc<dyn EventHandler>,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were called.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Thread-safe registration and dispatch table.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: RwLock<HashMap<EventKindTag, Arc<[CallbackEntry]>>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let counts: HashMap<EventKindTag, usize> =
            entries.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("CallbackRegistry").field("handlers", &counts).finish()
    }
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event kind.
    pub fn register<H>(&self, tag: EventKindTag, handler: H) -> CallbackHandle
    where
        H: EventHandler + 'static,
    {
        self.register_arc(tag, Arc::new(handler))
    }

    /// Registers a closure handler.
    pub fn register_fn<F>(&self, tag: EventKindTag, f: F) -> CallbackHandle
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(tag, f)
    }

    /// Registers a shared handler, e.g. one that is also registered for other kinds.
    pub fn register_arc(
        &self,
        tag: EventKindTag,
        handler: Arc<dyn EventHandler>,
    ) -> CallbackHandle {
        let id = CallbackId::new();
        let mut entries = self.entries.write();
        let current = entries.get(&tag).map(|e| &e[..]).unwrap_or_default();
        let mut next: Vec<CallbackEntry> = Vec::with_capacity(current.len() + 1);
        next.extend_from_slice(current);
        next.push(CallbackEntry { id, handler });
        entries.insert(tag, next.into());
        drop(entries);

        debug!(callback_id = %id, kind = %tag, "callback registered");
        CallbackHandle { id, tag }
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn unregister(&self, handle: &CallbackHandle) -> bool {
        let mut entries = self.entries.write();
        let Some(current) = entries.get(&handle.tag) else {
            return false;
        };
        if !current.iter().any(|e| e.id == handle.id) {
            return false;
        }

        let next: Vec<CallbackEntry> =
            current.iter().filter(|e| e.id != handle.id).cloned().collect();
        if next.is_empty() {
            entries.remove(&handle.tag);
        } else {
            entries.insert(handle.tag, next.into());
        }
        drop(entries);

        debug!(callback_id = %handle.id, kind = %handle.tag, "callback unregistered");
        true
    }

    #[must_use]
    pub fn handler_count(&self, tag: EventKindTag) -> usize {
        self.entries.read().get(&tag).map_or(0, |e| e.len())
    }

    /// Invokes every handler registered for the event's kind.
    ///
    /// Errors and panics are contained per handler: the rest still run.
    pub fn dispatch(&self, event: &Event) -> DispatchReport {
        let snapshot = self.entries.read().get(&event.tag()).cloned();
        let Some(snapshot) = snapshot else {
            return DispatchReport::default();
        };

        let mut report = DispatchReport::default();
        for entry in snapshot.iter() {
            report.invoked += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.handler.handle(event)))
                .unwrap_or_else(|payload| {
                    Err(HandlerError::Panicked {
                        message: panic_message(&*payload),
                    })
                });

            if let Err(err) = outcome {
                report.failed += 1;
                error!(
                    callback_id = %entry.id,
                    kind = %event.tag(),
                    sequence = event.sequence(),
                    error = %err,
                    "event handler failed"
                );
            }
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handler that hands events to another thread through a bounded channel.
///
/// Never blocks the consumer: a full channel is reported as a handler failure.
#[derive(Debug, Clone)]
pub struct ForwardingHandler {
    tx: Sender<Event>,
}

impl ForwardingHandler {
    /// Creates a handler and the receiving end its worker should drain.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<Event>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventHandler for ForwardingHandler {
    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(HandlerError::failed("forwarding channel full")),
            Err(TrySendError::Disconnected(_)) => Err(HandlerError::Disconnected),
        }
    }
}
