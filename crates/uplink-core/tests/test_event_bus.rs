use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uplink_core::event_bus::{wifi, USER_BASE};
use uplink_core::{
    BusError, Event, EventBus, EventBusConfig, EventId, EventSource, HandlerRef, ManualClock,
};

fn bus_with_queue(queue_size: usize) -> Arc<EventBus> {
    let config = EventBusConfig {
        queue_size,
        ..Default::default()
    };
    let bus = Arc::new(EventBus::new(config, Arc::new(ManualClock::new(1))));
    bus.init().unwrap();
    bus
}

fn wait_for(counter: &AtomicUsize, value: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while counter.load(Ordering::SeqCst) < value {
        assert!(Instant::now() < deadline, "timed out waiting for dispatcher");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_queue_overflow_drops_and_releases() {
    let bus = bus_with_queue(2);
    let gate = Arc::new(Mutex::new(()));
    let entered = Arc::new(AtomicUsize::new(0));

    let g = Arc::clone(&gate);
    let e = Arc::clone(&entered);
    bus.subscribe_fn(EventId::ANY, move |_| {
        e.fetch_add(1, Ordering::SeqCst);
        let _held = g.lock();
    })
    .unwrap();

    // Park the dispatcher inside the first delivery
    let held = gate.lock();
    bus.post_data(USER_BASE, EventSource::USER, b"one").unwrap();
    wait_for(&entered, 1);

    bus.post_data(USER_BASE, EventSource::USER, b"two").unwrap();
    bus.post_data(USER_BASE, EventSource::USER, b"three").unwrap();
    assert_eq!(
        bus.post_data(USER_BASE, EventSource::USER, b"four"),
        Err(BusError::QueueFull { event_id: 0x1000 })
    );

    let stats = bus.stats();
    assert_eq!(stats.published, 3);
    assert_eq!(stats.dropped, 1);
    // The dropped event's payload is released right away
    assert_eq!(stats.payloads_released, 1);

    drop(held);
    assert!(bus.wait_idle(Duration::from_secs(2)));

    let stats = bus.stats();
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.payloads_released, 4);
    bus.deinit().unwrap();
}

#[test]
fn test_owned_payload_released_once_per_event() {
    let bus = bus_with_queue(32);
    bus.subscribe_fn(wifi::CONNECTED, |_| {}).unwrap();
    bus.subscribe_fn(EventId::ANY, |_| {}).unwrap();

    for i in 0..5u8 {
        bus.post_data(wifi::CONNECTED, EventSource::WIFI, &[i]).unwrap();
    }
    assert!(bus.wait_idle(Duration::from_secs(2)));

    let stats = bus.stats();
    assert_eq!(stats.delivered, 10);
    assert_eq!(stats.payloads_released, 5);
    bus.deinit().unwrap();
}

#[test]
fn test_shared_payload_is_left_to_producer() {
    let bus = bus_with_queue(8);
    let bytes: Arc<[u8]> = Arc::from(&b"retained"[..]);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    bus.subscribe_fn(EventId::ANY, move |e| s.lock().push(e.data().to_vec()))
        .unwrap();

    bus.publish(Event::with_shared(USER_BASE, EventSource::USER, Arc::clone(&bytes)))
        .unwrap();
    assert!(bus.wait_idle(Duration::from_secs(2)));

    assert_eq!(seen.lock()[0], b"retained".to_vec());
    assert_eq!(Arc::strong_count(&bytes), 1);
    assert_eq!(bus.stats().payloads_released, 0);
    bus.deinit().unwrap();
}

#[test]
fn test_unsubscribe_during_dispatch_is_atomic() {
    let bus = bus_with_queue(8);
    let calls = Arc::new(AtomicUsize::new(0));

    let victim_calls = Arc::clone(&calls);
    let victim: HandlerRef = Arc::new(move |_: &Event| {
        victim_calls.fetch_add(1, Ordering::SeqCst);
    });

    // Registered after the victim, so it runs first and removes it mid-pass
    let weak_bus = Arc::downgrade(&bus);
    let v = Arc::clone(&victim);
    bus.subscribe(USER_BASE, Arc::clone(&victim)).unwrap();
    bus.subscribe_fn(USER_BASE, move |_| {
        if let Some(bus) = weak_bus.upgrade() {
            let _ = bus.unsubscribe(USER_BASE, &v);
        }
    })
    .unwrap();

    bus.post(USER_BASE, EventSource::USER).unwrap();
    bus.post(USER_BASE, EventSource::USER).unwrap();
    assert!(bus.wait_idle(Duration::from_secs(2)));

    // First pass still saw the old registry; second pass saw the new one
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count(), 1);
    bus.deinit().unwrap();
}

#[test]
fn test_per_producer_order_is_preserved() {
    let bus = bus_with_queue(64);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    bus.subscribe_fn(EventId::ANY, move |e| s.lock().push(e.data()[0]))
        .unwrap();

    for i in 0..20u8 {
        bus.post_data(USER_BASE, EventSource::USER, &[i]).unwrap();
    }
    assert!(bus.wait_idle(Duration::from_secs(2)));
    assert_eq!(*seen.lock(), (0..20u8).collect::<Vec<_>>());
    bus.deinit().unwrap();
}

#[test]
fn test_deinit_drains_queue_without_delivery() {
    let bus = bus_with_queue(8);
    let gate = Arc::new(Mutex::new(()));
    let entered = Arc::new(AtomicUsize::new(0));

    let g = Arc::clone(&gate);
    let e = Arc::clone(&entered);
    bus.subscribe_fn(EventId::ANY, move |_| {
        e.fetch_add(1, Ordering::SeqCst);
        let _held = g.lock();
    })
    .unwrap();

    let held = gate.lock();
    bus.post_data(USER_BASE, EventSource::USER, b"a").unwrap();
    wait_for(&entered, 1);
    bus.post_data(USER_BASE, EventSource::USER, b"b").unwrap();
    bus.post_data(USER_BASE, EventSource::USER, b"c").unwrap();

    let b = Arc::clone(&bus);
    let deinit = thread::spawn(move || b.deinit());
    thread::sleep(Duration::from_millis(20));
    drop(held);
    deinit.join().unwrap().unwrap();

    let stats = bus.stats();
    assert_eq!(entered.load(Ordering::SeqCst), 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.payloads_released, 3);
    assert!(!bus.is_initialized());
}
