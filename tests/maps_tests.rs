//! Integration tests for the byte-oriented map layer.
//!
//! Tests map creation, CRUD operations, and per-CPU value handling.

use kobserve::maps::{self, Error, MapDef, MapType};
use kobserve::platform;

fn hash_def() -> MapDef {
    MapDef {
        map_type: MapType::Hash,
        key_size: 4,
        value_size: 8,
        max_entries: 64,
    }
}

// =============================================================================
// Map Creation Tests
// =============================================================================

#[test]
fn test_create_hash_map() {
    let result = maps::create(&hash_def());
    assert!(result.is_ok());
}

#[test]
fn test_create_per_cpu_hash_map() {
    let def = MapDef {
        map_type: MapType::PerCpuHash,
        key_size: 4,
        value_size: 8,
        max_entries: 64,
    };
    let result = maps::create(&def);
    assert!(result.is_ok());
}

#[test]
fn test_create_rejects_zero_sizes() {
    let def = MapDef {
        map_type: MapType::Hash,
        key_size: 0,
        value_size: 8,
        max_entries: 64,
    };
    assert!(matches!(maps::create(&def), Err(Error::InvalidArgument)));
}

// =============================================================================
// Map CRUD Tests
// =============================================================================

#[test]
fn test_update_and_lookup() {
    let map_fd = maps::create(&hash_def()).unwrap();

    let key: u32 = 7;
    let value: u64 = 12345;
    maps::update_elem(map_fd, &key.to_le_bytes(), &value.to_le_bytes()).unwrap();

    let found = maps::lookup_elem(map_fd, &key.to_le_bytes()).unwrap();
    assert_eq!(found, value.to_le_bytes().to_vec());
}

#[test]
fn test_lookup_missing_key() {
    let map_fd = maps::create(&hash_def()).unwrap();
    assert!(maps::lookup_elem(map_fd, &99u32.to_le_bytes()).is_none());
}

#[test]
fn test_update_overwrites() {
    let map_fd = maps::create(&hash_def()).unwrap();
    let key = 1u32.to_le_bytes();

    maps::update_elem(map_fd, &key, &10u64.to_le_bytes()).unwrap();
    maps::update_elem(map_fd, &key, &20u64.to_le_bytes()).unwrap();

    let found = maps::lookup_elem(map_fd, &key).unwrap();
    assert_eq!(found, 20u64.to_le_bytes().to_vec());
}

#[test]
fn test_delete_elem() {
    let map_fd = maps::create(&hash_def()).unwrap();
    let key = 3u32.to_le_bytes();

    maps::update_elem(map_fd, &key, &1u64.to_le_bytes()).unwrap();
    maps::delete_elem(map_fd, &key).unwrap();
    assert!(maps::lookup_elem(map_fd, &key).is_none());

    // Deleting again reports the missing key.
    assert!(matches!(
        maps::delete_elem(map_fd, &key),
        Err(Error::KeyNotFound)
    ));
}

#[test]
fn test_operations_on_destroyed_map() {
    let map_fd = maps::create(&hash_def()).unwrap();
    maps::destroy(map_fd).unwrap();

    let key = 1u32.to_le_bytes();
    assert!(matches!(
        maps::update_elem(map_fd, &key, &1u64.to_le_bytes()),
        Err(Error::NotFound)
    ));
}

// =============================================================================
// Per-CPU Value Tests
// =============================================================================

#[test]
fn test_per_cpu_lookup_returns_all_slots() {
    let def = MapDef {
        map_type: MapType::PerCpuHash,
        key_size: 4,
        value_size: 8,
        max_entries: 64,
    };
    let map_fd = maps::create(&def).unwrap();
    let cpus = maps::get_map_cpus(map_fd).unwrap() as usize;
    assert_eq!(cpus, platform::cpu_count() as usize);

    let key = 5u32.to_le_bytes();
    maps::update_elem_this_cpu(map_fd, &key, &42u64.to_le_bytes()).unwrap();

    // The full value is one 8-byte slot per CPU.
    let value = maps::lookup_elem(map_fd, &key).unwrap();
    assert_eq!(value.len(), cpus * 8);
}

#[test]
fn test_this_cpu_ops_rejected_on_plain_hash() {
    let map_fd = maps::create(&hash_def()).unwrap();
    let key = 1u32.to_le_bytes();
    assert!(matches!(
        maps::update_elem_this_cpu(map_fd, &key, &1u64.to_le_bytes()),
        Err(Error::NotSupported)
    ));
}
