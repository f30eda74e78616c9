//! Event Bus implementation.
//!
//! A bounded queue feeding a single dispatcher thread. Producers on any thread
//! call [`EventBus::publish`], which never blocks; the dispatcher delivers each
//! event to every matching subscriber, newest subscription first.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::events::{Event, EventId, EventSource};
use crate::clock::ClockRef;
use crate::error::BusError;

/// Something that wants to hear about events
///
/// Handlers run on the dispatcher thread (or on the caller's thread for
/// [`EventBus::publish_sync`]) and should return quickly. Any closure taking
/// `&Event` is a handler.
pub trait EventHandler: Send + Sync {
    /// Handle one event
    fn handle(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}

/// Shared handler reference; identity is the `Arc` allocation
pub type HandlerRef = Arc<dyn EventHandler>;

/// Configuration for the event bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBusConfig {
    /// Maximum number of queued, undelivered events.
    pub queue_size: usize,
    /// Name given to the dispatcher thread.
    pub dispatcher_name: String,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_size: 32,
            dispatcher_name: "event_dispatcher".to_string(),
        }
    }
}

/// Snapshot of the bus counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Events accepted by `publish` or `publish_sync`.
    pub published: u64,
    /// Handler invocations.
    pub delivered: u64,
    /// Events rejected because the queue was full.
    pub dropped: u64,
    /// Owned payloads released by the bus.
    pub payloads_released: u64,
}

struct Subscriber {
    filter: EventId,
    handler: HandlerRef,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    payloads_released: AtomicU64,
}

/// State shared between the bus handle and its dispatcher thread
struct Shared {
    /// Newest subscription at index 0
    subscribers: Mutex<Vec<Subscriber>>,
    counters: Counters,
    /// Events enqueued but not yet fully dispatched
    pending: Mutex<usize>,
    idle: Condvar,
    stopping: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            counters: Counters::default(),
            pending: Mutex::new(0),
            idle: Condvar::new(),
            stopping: AtomicBool::new(false),
        }
    }

    fn dispatch(&self, event: Event) {
        let targets: Vec<HandlerRef> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .filter(|sub| sub.filter.matches(event.id))
                .map(|sub| Arc::clone(&sub.handler))
                .collect()
        };

        tracing::trace!("Dispatching {} to {} handler(s)", event, targets.len());
        for handler in &targets {
            handler.handle(&event);
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        }

        self.release(event);
    }

    fn release(&self, event: Event) {
        if event.owns_payload() {
            self.counters
                .payloads_released
                .fetch_add(1, Ordering::Relaxed);
        }
        drop(event);
    }

    fn begin(&self) {
        *self.pending.lock() += 1;
    }

    fn finish(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

struct Dispatcher {
    sender: mpsc::Sender<Event>,
    handle: JoinHandle<()>,
}

/// Device-wide publish/subscribe event bus
///
/// Created uninitialized; `init()` starts the dispatcher and `deinit()` tears
/// it down again. Owned by the application and shared behind an `Arc`.
pub struct EventBus {
    config: EventBusConfig,
    clock: ClockRef,
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl EventBus {
    /// Create an uninitialized bus
    pub fn new(config: EventBusConfig, clock: ClockRef) -> Self {
        Self {
            config,
            clock,
            shared: Arc::new(Shared::new()),
            dispatcher: Mutex::new(None),
        }
    }

    /// Create the queue and start the dispatcher thread
    pub fn init(&self) -> Result<(), BusError> {
        let mut slot = self.dispatcher.lock();
        if slot.is_some() {
            return Err(BusError::invalid_state("already initialized"));
        }
        if self.config.queue_size == 0 {
            return Err(BusError::InvalidArg {
                reason: "queue_size must be greater than zero".to_string(),
            });
        }

        let (sender, mut receiver) = mpsc::channel::<Event>(self.config.queue_size);
        self.shared.stopping.store(false, Ordering::SeqCst);
        *self.shared.pending.lock() = 0;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.config.dispatcher_name.clone())
            .spawn(move || {
                tracing::debug!("Event dispatcher started");
                while let Some(event) = receiver.blocking_recv() {
                    if shared.stopping.load(Ordering::SeqCst) {
                        receiver.close();
                        shared.release(event);
                    } else {
                        shared.dispatch(event);
                    }
                    shared.finish();
                }
                tracing::debug!("Event dispatcher stopped");
            })
            .map_err(|e| BusError::NoMemory {
                reason: format!("dispatcher thread: {}", e),
            })?;

        *slot = Some(Dispatcher { sender, handle });
        tracing::info!(
            "Event bus initialized (queue_size={}, dispatcher={})",
            self.config.queue_size,
            self.config.dispatcher_name
        );
        Ok(())
    }

    /// Stop the dispatcher, drop every subscription and drain the queue
    ///
    /// Queued events are released without being delivered.
    pub fn deinit(&self) -> Result<(), BusError> {
        let dispatcher = self
            .dispatcher
            .lock()
            .take()
            .ok_or_else(|| BusError::invalid_state("not initialized"))?;

        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.subscribers.lock().clear();

        let Dispatcher { sender, handle } = dispatcher;
        drop(sender);

        if handle.thread().id() == thread::current().id() {
            tracing::warn!("Event bus deinit called from the dispatcher; not joining");
        } else if handle.join().is_err() {
            tracing::error!("Event dispatcher panicked");
        }

        tracing::info!("Event bus deinitialized");
        Ok(())
    }

    /// True between `init()` and `deinit()`
    pub fn is_initialized(&self) -> bool {
        self.dispatcher.lock().is_some()
    }

    fn sender(&self) -> Result<mpsc::Sender<Event>, BusError> {
        self.dispatcher
            .lock()
            .as_ref()
            .map(|d| d.sender.clone())
            .ok_or_else(|| BusError::invalid_state("not initialized"))
    }

    fn stamp(&self, event: &mut Event) {
        if event.timestamp == 0 {
            event.timestamp = self.clock.now_ms();
        }
    }

    /// Queue an event for asynchronous delivery
    ///
    /// Never blocks. When the queue is full the event is dropped, its owned
    /// payload released, and `QueueFull` returned.
    pub fn publish(&self, mut event: Event) -> Result<(), BusError> {
        let sender = match self.sender() {
            Ok(sender) => sender,
            Err(e) => {
                self.shared.release(event);
                return Err(e);
            }
        };
        self.stamp(&mut event);

        self.shared.begin();
        match sender.try_send(event) {
            Ok(()) => {
                self.shared
                    .counters
                    .published
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                self.shared.finish();
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Event queue full, dropping {}", event);
                let event_id = event.id.raw();
                self.shared.release(event);
                Err(BusError::QueueFull { event_id })
            }
            Err(TrySendError::Closed(event)) => {
                self.shared.finish();
                self.shared.release(event);
                Err(BusError::invalid_state("dispatcher stopped"))
            }
        }
    }

    /// Deliver an event on the calling thread, bypassing the queue
    ///
    /// Returns after every matching handler has run.
    pub fn publish_sync(&self, mut event: Event) -> Result<(), BusError> {
        if !self.is_initialized() {
            self.shared.release(event);
            return Err(BusError::invalid_state("not initialized"));
        }
        self.stamp(&mut event);
        self.shared
            .counters
            .published
            .fetch_add(1, Ordering::Relaxed);
        self.shared.dispatch(event);
        Ok(())
    }

    /// Publish an event without payload
    pub fn post(&self, id: EventId, source: EventSource) -> Result<(), BusError> {
        self.publish(Event::new(id, source))
    }

    /// Publish an event carrying a bus-owned copy of `data`
    pub fn post_data(&self, id: EventId, source: EventSource, data: &[u8]) -> Result<(), BusError> {
        self.publish(Event::with_data(id, source, data))
    }

    /// Publish an event carrying a serialized typed payload
    pub fn post_payload<T: Serialize>(
        &self,
        id: EventId,
        source: EventSource,
        value: &T,
    ) -> Result<(), BusError> {
        self.publish(Event::with_payload(id, source, value)?)
    }

    /// Register a handler for `filter` (`EventId::ANY` for everything)
    ///
    /// The same handler may be registered several times.
    pub fn subscribe(&self, filter: EventId, handler: HandlerRef) -> Result<(), BusError> {
        if !self.is_initialized() {
            return Err(BusError::invalid_state("not initialized"));
        }
        self.shared
            .subscribers
            .lock()
            .insert(0, Subscriber { filter, handler });
        tracing::debug!("Subscribed to {}", filter);
        Ok(())
    }

    /// Register a closure, returning the handle needed to unsubscribe it
    pub fn subscribe_fn<F>(&self, filter: EventId, handler: F) -> Result<HandlerRef, BusError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler: HandlerRef = Arc::new(handler);
        self.subscribe(filter, Arc::clone(&handler))?;
        Ok(handler)
    }

    /// Remove the first subscription matching exactly `(filter, handler)`
    pub fn unsubscribe(&self, filter: EventId, handler: &HandlerRef) -> Result<(), BusError> {
        if !self.is_initialized() {
            return Err(BusError::invalid_state("not initialized"));
        }
        let mut subscribers = self.shared.subscribers.lock();
        let index = subscribers
            .iter()
            .position(|sub| sub.filter == filter && Arc::ptr_eq(&sub.handler, handler))
            .ok_or(BusError::NotFound {
                filter: filter.raw(),
            })?;
        subscribers.remove(index);
        tracing::debug!("Unsubscribed from {}", filter);
        Ok(())
    }

    /// Remove every subscription held by `handler`
    pub fn unsubscribe_all(&self, handler: &HandlerRef) -> Result<(), BusError> {
        if !self.is_initialized() {
            return Err(BusError::invalid_state("not initialized"));
        }
        let mut subscribers = self.shared.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|sub| !Arc::ptr_eq(&sub.handler, handler));
        tracing::debug!("Removed {} subscription(s)", before - subscribers.len());
        Ok(())
    }

    /// Number of registered subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Current counters
    pub fn stats(&self) -> BusStats {
        let c = &self.shared.counters;
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            payloads_released: c.payloads_released.load(Ordering::Relaxed),
        }
    }

    /// Events queued but not yet fully dispatched
    pub fn pending_count(&self) -> usize {
        *self.shared.pending.lock()
    }

    /// Block until the queue is empty and the dispatcher is idle
    ///
    /// Returns `false` on timeout. Must not be called from a handler.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let mut pending = self.shared.pending.lock();
        if *pending == 0 {
            return true;
        }
        let _ = self
            .shared
            .idle
            .wait_while_for(&mut pending, |p| *p > 0, timeout);
        *pending == 0
    }

    /// The bus configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Current tick of the bus clock
    pub fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if self.is_initialized() {
            let _ = self.deinit();
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .field("subscribers", &self.subscriber_count())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event_bus::events::{system, wifi, USER_BASE};

    fn bus() -> EventBus {
        let bus = EventBus::new(EventBusConfig::default(), Arc::new(ManualClock::new(500)));
        bus.init().unwrap();
        bus
    }

    #[test]
    fn test_lifecycle() {
        let bus = EventBus::new(EventBusConfig::default(), Arc::new(ManualClock::new(1)));
        assert!(!bus.is_initialized());
        assert!(matches!(bus.deinit(), Err(BusError::InvalidState { .. })));

        bus.init().unwrap();
        assert!(matches!(bus.init(), Err(BusError::InvalidState { .. })));
        bus.deinit().unwrap();

        // Re-init after deinit is allowed
        bus.init().unwrap();
        bus.deinit().unwrap();
    }

    #[test]
    fn test_zero_queue_rejected() {
        let config = EventBusConfig {
            queue_size: 0,
            ..Default::default()
        };
        let bus = EventBus::new(config, Arc::new(ManualClock::new(1)));
        assert!(matches!(bus.init(), Err(BusError::InvalidArg { .. })));
    }

    #[test]
    fn test_calls_before_init() {
        let bus = EventBus::new(EventBusConfig::default(), Arc::new(ManualClock::new(1)));
        assert!(matches!(
            bus.post(system::READY, EventSource::SYSTEM),
            Err(BusError::InvalidState { .. })
        ));
        assert!(matches!(
            bus.subscribe_fn(EventId::ANY, |_| {}),
            Err(BusError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_publish_sync_newest_first() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        bus.subscribe_fn(wifi::CONNECTED, move |_| o.lock().push("first"))
            .unwrap();
        let o = Arc::clone(&order);
        bus.subscribe_fn(EventId::ANY, move |_| o.lock().push("second"))
            .unwrap();
        let o = Arc::clone(&order);
        bus.subscribe_fn(wifi::GOT_IP, move |_| o.lock().push("unrelated"))
            .unwrap();

        bus.publish_sync(Event::new(wifi::CONNECTED, EventSource::WIFI))
            .unwrap();
        assert_eq!(*order.lock(), vec!["second", "first"]);
        assert_eq!(bus.stats().delivered, 2);
        assert_eq!(bus.stats().published, 1);
    }

    #[test]
    fn test_timestamp_stamping() {
        let bus = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        bus.subscribe_fn(EventId::ANY, move |e| s.lock().push(e.timestamp))
            .unwrap();

        bus.publish_sync(Event::new(USER_BASE, EventSource::USER))
            .unwrap();
        bus.publish_sync(Event::new(USER_BASE, EventSource::USER).at(7))
            .unwrap();
        assert_eq!(*seen.lock(), vec![500, 7]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = bus();
        let handler: HandlerRef = Arc::new(|_: &Event| {});
        bus.subscribe(wifi::CONNECTED, Arc::clone(&handler)).unwrap();
        bus.subscribe(wifi::GOT_IP, Arc::clone(&handler)).unwrap();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(
            bus.unsubscribe(wifi::LOST_IP, &handler),
            Err(BusError::NotFound { filter: 0x0106 })
        );
        bus.unsubscribe(wifi::CONNECTED, &handler).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        let other: HandlerRef = Arc::new(|_: &Event| {});
        bus.subscribe(wifi::GOT_IP, Arc::clone(&other)).unwrap();
        bus.unsubscribe_all(&handler).unwrap();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_async_delivery() {
        let bus = bus();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        bus.subscribe_fn(EventId::ANY, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..10 {
            bus.post(USER_BASE, EventSource::USER).unwrap();
        }
        assert!(bus.wait_idle(Duration::from_secs(2)));
        assert_eq!(count.load(Ordering::SeqCst), 10);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_deinit_clears_subscribers() {
        let bus = bus();
        bus.subscribe_fn(EventId::ANY, |_| {}).unwrap();
        bus.deinit().unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
