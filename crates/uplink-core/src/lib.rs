//! # Uplink Core
//!
//! Core types and utilities for Uplink.
//! Provides the event bus, the event record and its id space, the generic
//! FSM engine, the clock abstraction and the error taxonomy shared by every
//! connectivity component.

pub mod clock;
pub mod error;
pub mod event_bus;
pub mod fsm;
pub mod types;

pub use clock::{Clock, ClockRef, ManualClock, SystemClock};

pub use error::{BusError, ConnectionError, Error, FsmError, Result};

// Re-export event bus for convenience
pub use event_bus::{
    BusStats, Event, EventBus, EventBusConfig, EventCategory, EventHandler, EventId, EventSource,
    HandlerRef, Payload,
};

pub use fsm::{FromState, Fsm, FsmConfig, StateDef, Transition};

// Re-export type aliases for convenience
pub use types::{thread_safe, ThreadSafe};
