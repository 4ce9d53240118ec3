//! Integration tests for the per-UID message and counter stores.

use kobserve::config::{CounterStore, MessageStore, PerCpuCounterStore};
use kobserve::platform;
use kobserve::record::{CONFIG_VALUE_CAPACITY, DEFAULT_MESSAGE};

// Tests that move the mock CPU id share this lock; the id is process-global.
static CPU_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn text(value: &[u8; CONFIG_VALUE_CAPACITY]) -> &str {
    kobserve::record::text_until_nul(value)
}

// =============================================================================
// Message Store Tests
// =============================================================================

#[test]
fn test_unseeded_uid_gets_default_message() {
    let store = MessageStore::new().unwrap();
    let value = store.lookup_or_default(4242);
    assert_eq!(text(&value).as_bytes(), DEFAULT_MESSAGE);
}

#[test]
fn test_seeded_uid_gets_its_message() {
    let store = MessageStore::new().unwrap();
    let seeding = store.upsert(0, b"Hey root!").unwrap();
    assert!(!seeding.truncated);

    let value = store.lookup_or_default(0);
    assert_eq!(text(&value), "Hey root!");

    // Other UIDs are unaffected.
    let other = store.lookup_or_default(501);
    assert_eq!(text(&other).as_bytes(), DEFAULT_MESSAGE);
}

#[test]
fn test_upsert_overwrites() {
    let store = MessageStore::new().unwrap();
    store.upsert(501, b"Hi user 501!").unwrap();
    store.upsert(501, b"Bye!").unwrap();
    assert_eq!(text(&store.lookup_or_default(501)), "Bye!");
}

#[test]
fn test_value_at_exact_capacity() {
    let store = MessageStore::new().unwrap();
    let exact = [b'a'; CONFIG_VALUE_CAPACITY];
    let seeding = store.upsert(7, &exact).unwrap();
    assert!(!seeding.truncated);
    assert_eq!(store.lookup_or_default(7), exact);
}

#[test]
fn test_value_one_over_capacity_truncates() {
    let store = MessageStore::new().unwrap();
    let over = [b'b'; CONFIG_VALUE_CAPACITY + 1];
    let seeding = store.upsert(8, &over).unwrap();
    assert!(seeding.truncated);

    // Exactly capacity bytes survive; nothing past the bound is written.
    assert_eq!(store.lookup_or_default(8), [b'b'; CONFIG_VALUE_CAPACITY]);
}

// =============================================================================
// Counter Store Tests
// =============================================================================

#[test]
fn test_counter_bump_and_get() {
    let store = CounterStore::new().unwrap();
    assert_eq!(store.get(1000), 0);

    for _ in 0..5 {
        store.bump(1000).unwrap();
    }
    assert_eq!(store.get(1000), 5);
    assert_eq!(store.get(1001), 0);
}

#[test]
fn test_per_cpu_counter_shards_sum_to_total() {
    let _guard = CPU_LOCK.lock().unwrap();
    platform::set_mock_cpu_count(4);
    platform::set_mock_cpu_id(0);

    let store = PerCpuCounterStore::new().unwrap();

    // Bump from three different CPUs with uneven counts.
    for (cpu, bumps) in [(0u32, 3usize), (1, 1), (3, 2)] {
        platform::set_mock_cpu_id(cpu);
        for _ in 0..bumps {
            store.bump(77).unwrap();
        }
    }
    platform::set_mock_cpu_id(0);

    let shards = store.shards(77);
    assert_eq!(shards, vec![3, 1, 0, 2]);
    assert_eq!(store.total(77), 6);
}

#[test]
fn test_per_cpu_counter_absent_key() {
    let _guard = CPU_LOCK.lock().unwrap();
    platform::set_mock_cpu_count(4);

    let store = PerCpuCounterStore::new().unwrap();
    assert_eq!(store.total(999), 0);
    assert_eq!(store.shards(999), vec![0, 0, 0, 0]);
}
