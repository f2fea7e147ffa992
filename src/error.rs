//! Error types for posture-bus.
//!
//! Producer-facing failures are returned as typed results; handler failures
//! are recovered inside dispatch and only surface through logs and counters.

use thiserror::Error;

use crate::event::Priority;

/// Why an event did not make it into the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("Queue full (capacity {capacity}): {priority} event dropped")]
    QueueFull {
        priority: Priority,
        capacity: usize,
    },

    #[error("Critical event could not be enqueued within {timeout_ms}ms")]
    CriticalTimeout {
        timeout_ms: u64,
    },

    #[error("Event bus is shutting down")]
    ShuttingDown,
}

impl DropReason {
    /// Returns true for the near-fatal critical timeout.
    #[must_use]
    pub const fn is_critical_timeout(&self) -> bool {
        matches!(self, Self::CriticalTimeout { .. })
    }
}

/// A state access could not acquire its lock within budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Lock on {resource} not acquired within {timeout_ms}ms")]
pub struct LockTimeout {
    pub resource: &'static str,
    pub timeout_ms: u64,
}

/// Failure reported by a registered event handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Handler failed: {message}")]
    Failed {
        message: String,
    },

    #[error("Handler panicked: {message}")]
    Panicked {
        message: String,
    },

    #[error("Handler target disconnected")]
    Disconnected,
}

impl HandlerError {
    /// Creates a generic handler failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Config field '{field}' must be greater than zero")]
    MustBePositive {
        field: &'static str,
    },

    #[error("Invalid config: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Top-level error type for posture-bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Event dropped: {0}")]
    Dropped(#[from] DropReason),

    #[error("State access failed: {0}")]
    LockTimeout(#[from] LockTimeout),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Consumer did not stop within {timeout_ms}ms")]
    ShutdownTimeout {
        timeout_ms: u64,
    },
}

impl BusError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout(_) => true,
            Self::Dropped(reason) => matches!(
                reason,
                DropReason::QueueFull { .. } | DropReason::CriticalTimeout { .. }
            ),
            Self::Validation(_) | Self::Spawn { .. } | Self::ShutdownTimeout { .. } => false,
        }
    }
}

/// Result type alias for posture-bus operations.
pub type BusResult<T> = Result<T, BusError>;
