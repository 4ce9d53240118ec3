//! Per-identity configuration and counter stores.
//!
//! Typed wrappers over the byte-oriented map layer. The message store is the
//! per-UID display message table: looked up on the probe path on every
//! triggering event, seeded and updated from the control side at any time.
//! Counter stores exist in two variants; the plain one accepts lost updates
//! under concurrent same-key bumps, the per-CPU one does not.

use alloc::vec;

use crate::maps::{self, MapDef, MapType};
use crate::record::{CONFIG_VALUE_CAPACITY, DEFAULT_MESSAGE, copy_bounded};

/// Default capacity for the per-identity stores.
const STORE_MAX_ENTRIES: u32 = 10240;

/// Outcome of a control-side seeding write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seeding {
    /// Whether the value text was cut at [`CONFIG_VALUE_CAPACITY`].
    pub truncated: bool,
}

/// Per-UID display message store.
///
/// Absence of a key is a valid, common state meaning "use the default
/// message"; there is no deletion path.
#[derive(Debug, Clone, Copy)]
pub struct MessageStore {
    map_fd: u32,
}

impl MessageStore {
    /// Create the backing hash map.
    pub fn new() -> Result<Self, maps::Error> {
        let def = MapDef {
            map_type: MapType::Hash,
            key_size: 4,
            value_size: CONFIG_VALUE_CAPACITY as u32,
            max_entries: STORE_MAX_ENTRIES,
        };
        let map_fd = maps::create(&def)?;
        Ok(Self { map_fd })
    }

    /// Insert or overwrite the message for a UID.
    ///
    /// Text longer than [`CONFIG_VALUE_CAPACITY`] is truncated at capacity
    /// (the smaller-of-two-capacities rule), never written past the value
    /// bound. The outcome reports whether truncation happened so callers can
    /// surface it. Legal while probes are live.
    pub fn upsert(&self, uid: u32, text: &[u8]) -> Result<Seeding, maps::Error> {
        let mut value = [0u8; CONFIG_VALUE_CAPACITY];
        let copied = copy_bounded(&mut value, text);
        if copied < text.len() {
            log::warn!(
                "config value for uid {} truncated to {} bytes",
                uid,
                CONFIG_VALUE_CAPACITY
            );
        }
        maps::update_elem(self.map_fd, &uid.to_le_bytes(), &value)?;
        Ok(Seeding {
            truncated: copied < text.len(),
        })
    }

    /// Point query executed on the probe path.
    ///
    /// Returns the stored message, or [`DEFAULT_MESSAGE`] when the UID has
    /// no entry. Never blocks; the value is copied out under a spinlock.
    pub fn lookup_or_default(&self, uid: u32) -> [u8; CONFIG_VALUE_CAPACITY] {
        let mut out = [0u8; CONFIG_VALUE_CAPACITY];
        match maps::lookup_elem(self.map_fd, &uid.to_le_bytes()) {
            Some(value) => {
                copy_bounded(&mut out, &value);
            }
            None => {
                copy_bounded(&mut out, DEFAULT_MESSAGE);
            }
        }
        out
    }

    /// Backing map fd.
    pub fn map_fd(&self) -> u32 {
        self.map_fd
    }
}

/// Per-UID event counter with read-modify-write updates.
///
/// Concurrent bumps for the same key from multiple CPUs can lose increments;
/// this is an accepted statistical imprecision of the simple map, not a bug
/// to be papered over with a lock the probe path cannot take. Use
/// [`PerCpuCounterStore`] when exact counts are required.
#[derive(Debug, Clone, Copy)]
pub struct CounterStore {
    map_fd: u32,
}

impl CounterStore {
    /// Create the backing hash map.
    pub fn new() -> Result<Self, maps::Error> {
        let def = MapDef {
            map_type: MapType::Hash,
            key_size: 4,
            value_size: 8,
            max_entries: STORE_MAX_ENTRIES,
        };
        let map_fd = maps::create(&def)?;
        Ok(Self { map_fd })
    }

    /// Increment the counter for a UID, inserting zero first when absent.
    pub fn bump(&self, uid: u32) -> Result<(), maps::Error> {
        let key = uid.to_le_bytes();
        let current = match maps::lookup_elem(self.map_fd, &key) {
            Some(value) => u64_from_bytes(&value),
            None => 0,
        };
        maps::update_elem(self.map_fd, &key, &(current + 1).to_le_bytes())
    }

    /// Read the counter for a UID (0 when absent).
    pub fn get(&self, uid: u32) -> u64 {
        maps::lookup_elem(self.map_fd, &uid.to_le_bytes())
            .map(|v| u64_from_bytes(&v))
            .unwrap_or(0)
    }
}

/// Per-UID event counter sharded by CPU.
///
/// `bump` touches only the calling CPU's slot, so concurrent bumps on
/// different CPUs never collide. `total` sums the shards.
#[derive(Debug, Clone, Copy)]
pub struct PerCpuCounterStore {
    map_fd: u32,
}

impl PerCpuCounterStore {
    /// Create the backing per-CPU hash map.
    ///
    /// The CPU count is captured here; create the store after the platform
    /// reports its final CPU count.
    pub fn new() -> Result<Self, maps::Error> {
        let def = MapDef {
            map_type: MapType::PerCpuHash,
            key_size: 4,
            value_size: 8,
            max_entries: STORE_MAX_ENTRIES,
        };
        let map_fd = maps::create(&def)?;
        Ok(Self { map_fd })
    }

    /// Increment the calling CPU's counter slot for a UID.
    pub fn bump(&self, uid: u32) -> Result<(), maps::Error> {
        let key = uid.to_le_bytes();
        let current = match maps::lookup_elem_this_cpu(self.map_fd, &key)? {
            Some(value) => u64_from_bytes(&value),
            None => 0,
        };
        maps::update_elem_this_cpu(self.map_fd, &key, &(current + 1).to_le_bytes())
    }

    /// Sum all CPU shards for a UID (0 when absent).
    pub fn total(&self, uid: u32) -> u64 {
        let Some(slots) = maps::lookup_elem(self.map_fd, &uid.to_le_bytes()) else {
            return 0;
        };
        slots.chunks_exact(8).map(u64_from_bytes).sum()
    }

    /// Per-CPU counter values for a UID, in CPU order.
    pub fn shards(&self, uid: u32) -> alloc::vec::Vec<u64> {
        match maps::lookup_elem(self.map_fd, &uid.to_le_bytes()) {
            Some(slots) => slots.chunks_exact(8).map(u64_from_bytes).collect(),
            None => {
                let cpus = maps::get_map_cpus(self.map_fd).unwrap_or(1);
                vec![0; cpus as usize]
            }
        }
    }
}

fn u64_from_bytes(value: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    copy_bounded(&mut buf, value);
    u64::from_le_bytes(buf)
}
