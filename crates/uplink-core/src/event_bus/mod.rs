//! # Event Bus Module
//!
//! Decoupled communication between the connectivity components.
//!
//! ## Overview
//!
//! - Producers on any thread publish small event records without knowing who listens
//! - A single dispatcher thread delivers each event to every matching subscriber
//! - Subscribers filter on one event id, or on `EventId::ANY`
//! - A full queue drops the new event instead of blocking the producer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uplink_core::clock::SystemClock;
//! use uplink_core::event_bus::{wifi, EventBus, EventBusConfig, EventSource};
//!
//! let bus = Arc::new(EventBus::new(EventBusConfig::default(), SystemClock::shared()));
//! bus.init()?;
//!
//! let handler = bus.subscribe_fn(wifi::GOT_IP, |event| {
//!     tracing::info!("Got IP at {}ms", event.timestamp);
//! })?;
//!
//! bus.post(wifi::GOT_IP, EventSource::WIFI)?;
//!
//! bus.unsubscribe(wifi::GOT_IP, &handler)?;
//! bus.deinit()?;
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
