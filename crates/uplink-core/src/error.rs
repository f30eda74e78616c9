//! Error handling for Uplink
//!
//! Provides error types for every layer of the orchestration core:
//! - Event bus errors (lifecycle, queue overflow, registry lookups)
//! - FSM errors (lifecycle, missing transitions, guard rejections)
//! - Connection errors (collaborator drivers, credential storage)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Event bus error type
///
/// Returned only to the immediate caller of a bus operation. Queue overflow is
/// handled locally by the bus (drop + counter) and surfaces here as `QueueFull`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A required parameter was empty or out of range
    #[error("Invalid argument: {reason}")]
    InvalidArg {
        /// Why the argument was rejected.
        reason: String,
    },

    /// Operation attempted before `init()` or after `deinit()`
    #[error("Event bus is not in a valid state for this operation: {reason}")]
    InvalidState {
        /// What the bus was doing when the call arrived.
        reason: String,
    },

    /// Dispatcher thread or queue could not be created
    #[error("Out of resources: {reason}")]
    NoMemory {
        /// The resource that could not be allocated.
        reason: String,
    },

    /// Queue full, event dropped
    #[error("Event queue full, dropped event 0x{event_id:04x}")]
    QueueFull {
        /// Id of the dropped event.
        event_id: u16,
    },

    /// No subscriber entry matched the `(filter, handler)` pair
    #[error("No subscription for filter 0x{filter:04x}")]
    NotFound {
        /// The filter id that was looked up.
        filter: u16,
    },

    /// Typed payload could not be encoded or decoded
    #[error("Payload error: {reason}")]
    Payload {
        /// The serializer's message.
        reason: String,
    },
}

impl BusError {
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        BusError::InvalidState {
            reason: reason.into(),
        }
    }
}

/// FSM engine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    /// Empty state table, unknown initial state or unknown target state
    #[error("[{fsm}] invalid argument: {reason}")]
    InvalidArg {
        /// Name of the state machine.
        fsm: String,
        /// What was wrong.
        reason: String,
    },

    /// Operation not allowed in the current lifecycle phase
    #[error("[{fsm}] invalid state: {reason}")]
    InvalidState {
        /// Name of the state machine.
        fsm: String,
        /// What was wrong.
        reason: String,
    },

    /// No transition matches the event in the current state
    #[error("[{fsm}] no transition for event {event} in state {state}")]
    NotFound {
        /// Name of the state machine.
        fsm: String,
        /// Event that found no rule.
        event: String,
        /// Name of the current state.
        state: String,
    },

    /// A guard vetoed the transition
    #[error("[{fsm}] guard rejected event {event}")]
    NotAllowed {
        /// Name of the state machine.
        fsm: String,
        /// Event that was vetoed.
        event: String,
    },
}

/// Connection error type
///
/// Represents failures reported by, or detected around, the external
/// collaborators (WiFi driver, MQTT client, BLE provisioner, key-value store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Missing or empty required parameter
    #[error("Invalid argument: {reason}")]
    InvalidArg {
        /// What was wrong.
        reason: String,
    },

    /// Manager used in the wrong lifecycle phase
    #[error("{component} is {reason}")]
    InvalidState {
        /// The component that rejected the call.
        component: String,
        /// The phase it was in, e.g. "not initialized".
        reason: String,
    },

    /// Opaque transport error reported by a driver
    #[error("{component} driver error: {reason}")]
    Driver {
        /// The driver that failed.
        component: String,
        /// The driver's message.
        reason: String,
    },

    /// Credential or key-value storage failure
    #[error("Storage error: {reason}")]
    Storage {
        /// The storage backend's message.
        reason: String,
    },

    /// Operation timed out
    #[error("{component} timed out after {timeout_ms}ms")]
    Timeout {
        /// The component that timed out.
        component: String,
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },
}

impl ConnectionError {
    /// Shorthand for a driver failure
    pub fn driver(component: impl Into<String>, reason: impl Into<String>) -> Self {
        ConnectionError::Driver {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an uninitialized component
    pub fn not_initialized(component: impl Into<String>) -> Self {
        ConnectionError::InvalidState {
            component: component.into(),
            reason: "not initialized".to_string(),
        }
    }

    /// Shorthand for a second `init()`
    pub fn already_initialized(component: impl Into<String>) -> Self {
        ConnectionError::InvalidState {
            component: component.into(),
            reason: "already initialized".to_string(),
        }
    }

    /// Shorthand for a component that is not running
    pub fn not_running(component: impl Into<String>) -> Self {
        ConnectionError::InvalidState {
            component: component.into(),
            reason: "not running".to_string(),
        }
    }

    /// Shorthand for a rejected argument
    pub fn invalid_arg(reason: impl Into<String>) -> Self {
        ConnectionError::InvalidArg {
            reason: reason.into(),
        }
    }
}

/// Main error type for Uplink
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Event bus error
    #[error(transparent)]
    Bus(#[from] BusError),

    /// FSM error
    #[error(transparent)]
    Fsm(#[from] FsmError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is an "expected miss" (no transition / no subscription)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Bus(BusError::NotFound { .. }) | Error::Fsm(FsmError::NotFound { .. })
        )
    }

    /// Check if this is a lifecycle violation
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Error::Bus(BusError::InvalidState { .. })
                | Error::Fsm(FsmError::InvalidState { .. })
                | Error::Connection(ConnectionError::InvalidState { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
