//! End-to-end delivery and caching through the assembled client.

mod common;

use common::{client, fast_config, init_tracing, message, topic, wait_for, Inbox};
use courier::{
    CacheConfig, CacheEngine, Courier, DurableStorage, EngineState, FileStorage, HostInfo,
    InMemoryTransport, ManualClock, MemoryStorage, Message, SendOptions, SetOptions, StrategyKind,
    SystemClock, Timestamp, Watermark,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// --- Delivery ---

#[test]
fn test_send_reaches_subscribers_and_history() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let courier = client(transport.clone(), HostInfo::fetch_only());
    let inbox = Inbox::default();

    let token = courier.subscribe("g1", inbox.callback()).unwrap();
    let sent = courier
        .send("g1", "hello", SendOptions::from_sender("u1", "Alice"))
        .wait()
        .unwrap();
    assert_eq!(sent.content, "hello");
    assert_eq!(sent.sender_name, "Alice");

    assert!(wait_for(|| inbox.ids() == vec![sent.id.0.clone()]));
    let history = courier.get_cached("g1", 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, sent.id);

    assert!(courier.unsubscribe(&token));
}

#[test]
fn test_push_host_delivers_without_polling() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let courier = client(transport.clone(), HostInfo::with_change_stream("2.9.0"));
    let inbox = Inbox::default();

    courier.subscribe("g1", inbox.callback()).unwrap();
    assert!(courier.capability().supports_push);
    assert_eq!(
        courier.registry().engine_state(&topic("g1")),
        Some(EngineState::Active(StrategyKind::Push))
    );

    transport.publish(message("g1", 1, 100));
    transport.publish(message("g1", 2, 101));
    assert_eq!(inbox.ids(), vec!["1", "2"]);
    // One catch-up fetch at attach time, no polling after it
    thread::sleep(Duration::from_millis(40));
    assert_eq!(transport.fetch_count(&topic("g1")), 1);
}

#[test]
fn test_push_resubscribe_catches_up_on_missed_messages() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let courier = client(transport.clone(), HostInfo::with_change_stream("2.9.0"));

    let first = Inbox::default();
    let token = courier.subscribe("g1", first.callback()).unwrap();
    transport.publish(message("g1", 1, 100));
    assert_eq!(first.ids(), vec!["1"]);
    assert!(courier.unsubscribe(&token));

    // Written while the topic had no listener
    transport.publish(message("g1", 2, 101));

    let second = Inbox::default();
    courier.subscribe("g1", second.callback()).unwrap();
    transport.publish(message("g1", 3, 102));

    assert_eq!(second.ids(), vec!["2", "3"]);
    let cached: Vec<String> = courier
        .get_cached("g1", 10)
        .into_iter()
        .map(|m| m.id.0)
        .collect();
    assert_eq!(cached, vec!["1", "2", "3"]);
}

#[test]
fn test_push_cold_start_delivers_history() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    transport.publish(message("g1", 1, 100));
    transport.publish(message("g1", 2, 101));
    let courier = client(transport.clone(), HostInfo::with_change_stream("2.9.0"));
    let inbox = Inbox::default();

    courier.subscribe("g1", inbox.callback()).unwrap();
    assert_eq!(inbox.ids(), vec!["1", "2"]);
    assert_eq!(
        courier.registry().engine_state(&topic("g1")),
        Some(EngineState::Active(StrategyKind::Push))
    );
}

#[test]
fn test_three_subscribers_share_one_poll_loop() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let mut config = fast_config();
    config.delivery.poll_interval = Duration::from_millis(50);
    let courier = Courier::new(config, transport.clone(), Arc::new(HostInfo::fetch_only())).unwrap();

    let inboxes = [Inbox::default(), Inbox::default(), Inbox::default()];
    for inbox in &inboxes {
        courier.subscribe("g1", inbox.callback()).unwrap();
    }
    transport.publish(message("g1", 1, 100));
    assert!(wait_for(|| inboxes.iter().all(|inbox| inbox.len() == 1)));

    // One loop: roughly one fetch per interval, not three
    thread::sleep(Duration::from_millis(220));
    let fetches = transport.fetch_count(&topic("g1"));
    assert!(fetches <= 8, "expected a single poll loop, saw {} fetches", fetches);
    assert_eq!(courier.registry().topic_count(), 1);
}

#[test]
fn test_teardown_stops_transport_calls() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let courier = client(transport.clone(), HostInfo::fetch_only());

    let a = courier.subscribe("g1", |_: &Message| {}).unwrap();
    let b = courier.subscribe("g1", |_: &Message| {}).unwrap();
    assert!(wait_for(|| transport.fetch_count(&topic("g1")) >= 2));

    courier.unsubscribe(&a);
    assert_eq!(courier.registry().subscriber_count(&topic("g1")), 1);
    courier.unsubscribe(&b);
    assert_eq!(courier.registry().topic_count(), 0);

    thread::sleep(Duration::from_millis(30));
    let settled = transport.fetch_count(&topic("g1"));
    thread::sleep(Duration::from_millis(80));
    assert_eq!(transport.fetch_count(&topic("g1")), settled);
}

#[test]
fn test_resubscribe_resumes_from_watermark() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let courier = client(transport.clone(), HostInfo::fetch_only());
    transport.publish(message("g1", 1, 100));
    transport.publish(message("g1", 2, 101));

    let first = Inbox::default();
    let token = courier.subscribe("g1", first.callback()).unwrap();
    assert!(wait_for(|| first.len() == 2));
    courier.unsubscribe(&token);

    transport.publish(message("g1", 3, 102));
    let second = Inbox::default();
    courier.subscribe("g1", second.callback()).unwrap();
    assert!(wait_for(|| second.len() == 1));
    thread::sleep(Duration::from_millis(40));
    assert_eq!(second.ids(), vec!["3"]);
    assert_eq!(
        courier.messages().watermark(&topic("g1")),
        Watermark::at(Timestamp(102), 3u64)
    );
}

#[test]
fn test_topics_are_isolated() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let courier = client(transport.clone(), HostInfo::fetch_only());
    let g1 = Inbox::default();
    let g2 = Inbox::default();

    courier.subscribe("g1", g1.callback()).unwrap();
    courier.subscribe("g2", g2.callback()).unwrap();
    transport.publish(message("g1", 1, 100));
    transport.publish(message("g2", 7, 100));

    assert!(wait_for(|| g1.len() == 1 && g2.len() == 1));
    assert_eq!(g1.ids(), vec!["1"]);
    assert_eq!(g2.ids(), vec!["7"]);
    assert_eq!(courier.registry().topic_count(), 2);
}

// --- Cache ---

#[test]
fn test_eviction_scenario() {
    let cache = CacheEngine::new(CacheConfig::default().with_max_entries(2));
    cache.set("a", &1, SetOptions::new()).unwrap();
    cache.set("b", &2, SetOptions::new()).unwrap();
    assert_eq!(cache.get::<i32>("a"), Some(1));
    cache.set("c", &3, SetOptions::new()).unwrap();

    assert!(cache.has("a"));
    assert!(!cache.has("b"));
    assert!(cache.has("c"));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_ttl_boundary() {
    let clock = Arc::new(ManualClock::new(Timestamp(10_000)));
    let cache = CacheEngine::with_clock(CacheConfig::default(), clock.clone());
    cache
        .set("k", &"v", SetOptions::new().ttl(Duration::from_millis(1000)))
        .unwrap();

    clock.advance(Duration::from_millis(999));
    assert_eq!(cache.get_or("k", "default".to_string()), "v");
    clock.advance(Duration::from_millis(2));
    assert_eq!(cache.get_or("k", "default".to_string()), "default");
}

#[test]
fn test_invalidation_by_tag_and_pattern() {
    let cache = CacheEngine::new(CacheConfig::default());
    cache.set("user_1", &1, SetOptions::new().tag("users")).unwrap();
    cache.set("user_2", &2, SetOptions::new().tag("users")).unwrap();
    cache.set("group_1", &3, SetOptions::new().tag("groups")).unwrap();
    cache.set("group_2", &4, SetOptions::new()).unwrap();

    assert_eq!(cache.delete_by_tags(["users"]), 2);
    assert_eq!(cache.delete_by_pattern("^group_\\d$").unwrap(), 2);
    assert!(cache.is_empty());
}

// --- Persistence ---

#[test]
fn test_history_survives_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(InMemoryTransport::new());
    transport.publish(message("g1", 1, 100));
    transport.publish(message("g1", 2, 101));

    {
        let config = fast_config().with_storage_path(dir.path());
        let courier = Courier::new(config, transport.clone(), Arc::new(HostInfo::fetch_only())).unwrap();
        let inbox = Inbox::default();
        courier.subscribe("g1", inbox.callback()).unwrap();
        assert!(wait_for(|| inbox.len() == 2));
        courier
            .cache()
            .set("profile", &"alice", SetOptions::new().persistent())
            .unwrap();
        courier.cache().set("scratch", &1, SetOptions::new()).unwrap();
    }

    let config = fast_config().with_storage_path(dir.path());
    let courier = Courier::new(config, transport.clone(), Arc::new(HostInfo::fetch_only())).unwrap();

    // Cached history is available before any network round trip
    let history = courier.get_cached("g1", 10);
    assert_eq!(history.len(), 2);
    assert_eq!(courier.cache().get::<String>("profile").as_deref(), Some("alice"));
    assert!(!courier.cache().has("scratch"));

    // And delivery resumes after the persisted watermark
    transport.publish(message("g1", 3, 102));
    let inbox = Inbox::default();
    courier.subscribe("g1", inbox.callback()).unwrap();
    assert!(wait_for(|| inbox.len() == 1));
    thread::sleep(Duration::from_millis(40));
    assert_eq!(inbox.ids(), vec!["3"]);
}

#[test]
fn test_expired_persisted_entries_dropped_on_restore() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp(0)));

    {
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let cache = CacheEngine::with_storage(CacheConfig::default(), storage, clock.clone());
        cache
            .set("short", &1, SetOptions::new().persistent().ttl(Duration::from_secs(1)))
            .unwrap();
        cache
            .set("long", &2, SetOptions::new().persistent().ttl(Duration::from_secs(60)))
            .unwrap();
    }

    clock.advance(Duration::from_secs(5));
    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    let cache = CacheEngine::with_storage(CacheConfig::default(), storage.clone(), clock);
    assert!(!cache.has("short"));
    assert_eq!(cache.get::<i32>("long"), Some(2));

    assert_eq!(storage.keys().unwrap(), vec!["courier_cache_long".to_string()]);
}

#[test]
fn test_shutdown_is_idempotent() {
    let transport = Arc::new(InMemoryTransport::new());
    let courier = Courier::with_storage(
        fast_config(),
        transport,
        Arc::new(HostInfo::fetch_only()),
        Arc::new(MemoryStorage::new()),
        Arc::new(SystemClock),
    )
    .unwrap();
    courier.subscribe("g1", |_: &Message| {}).unwrap();

    courier.shutdown();
    courier.shutdown();
    assert_eq!(courier.registry().topic_count(), 0);
}
