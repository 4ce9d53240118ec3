//! Byte-oriented map storage shared by probe and control sides.
//!
//! Maps are registered in a global fd-indexed table. The probe side performs
//! point lookups under a spinlock (never a blocking lock) and copies values
//! out, so a concurrent control-side update can never corrupt an in-flight
//! read. Per-CPU hash maps keep one value slot per CPU and are the upgrade
//! path when lost read-modify-write updates are not acceptable.

use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashMap;
use spin::Mutex;

use crate::platform;

/// Map type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapType {
    /// Hash table with arbitrary fixed-size keys.
    Hash,
    /// Hash table with one value slot per CPU.
    PerCpuHash,
}

/// Map definition for creating new maps.
#[derive(Debug, Clone)]
pub struct MapDef {
    /// Type of map.
    pub map_type: MapType,
    /// Size of key in bytes.
    pub key_size: u32,
    /// Size of one value in bytes (per CPU slot for `PerCpuHash`).
    pub value_size: u32,
    /// Maximum number of entries.
    pub max_entries: u32,
}

/// Error types for map operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Map not found.
    NotFound,
    /// Key not found in map.
    KeyNotFound,
    /// Map is full.
    NoSpace,
    /// Invalid argument.
    InvalidArgument,
    /// Operation not supported for this map type.
    NotSupported,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Map not found"),
            Self::KeyNotFound => write!(f, "Key not found"),
            Self::NoSpace => write!(f, "Map is full"),
            Self::InvalidArgument => write!(f, "Invalid argument"),
            Self::NotSupported => write!(f, "Operation not supported for this map type"),
        }
    }
}

impl core::error::Error for Error {}

/// Internal map storage.
///
/// `PerCpuHash` entries hold `value_size * cpus` bytes, one slot per CPU,
/// with the CPU count captured at creation time.
struct MapStorage {
    def: MapDef,
    cpus: u32,
    data: HashMap<Vec<u8>, Vec<u8>>,
}

impl MapStorage {
    fn new(def: MapDef) -> Self {
        let cpus = match def.map_type {
            MapType::Hash => 1,
            MapType::PerCpuHash => platform::cpu_count(),
        };
        Self {
            def,
            cpus,
            data: HashMap::new(),
        }
    }

    fn stored_value_size(&self) -> usize {
        self.def.value_size as usize * self.cpus as usize
    }

    fn check_key(&self, key: &[u8]) -> Result<(), Error> {
        if key.len() != self.def.key_size as usize {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    fn lookup(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.check_key(key)?;
        if value.len() != self.stored_value_size() {
            return Err(Error::InvalidArgument);
        }

        if let Some(slot) = self.data.get_mut(key) {
            slot.copy_from_slice(value);
            return Ok(());
        }

        if self.data.len() >= self.def.max_entries as usize {
            return Err(Error::NoSpace);
        }
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Write one CPU slot, creating a zeroed entry when the key is absent.
    fn update_cpu_slot(&mut self, key: &[u8], cpu: u32, value: &[u8]) -> Result<(), Error> {
        self.check_key(key)?;
        if self.def.map_type != MapType::PerCpuHash {
            return Err(Error::NotSupported);
        }
        if value.len() != self.def.value_size as usize || cpu >= self.cpus {
            return Err(Error::InvalidArgument);
        }

        if !self.data.contains_key(key) {
            if self.data.len() >= self.def.max_entries as usize {
                return Err(Error::NoSpace);
            }
            self.data
                .insert(key.to_vec(), vec![0u8; self.stored_value_size()]);
        }

        let slot = self.data.get_mut(key).ok_or(Error::KeyNotFound)?;
        let off = cpu as usize * self.def.value_size as usize;
        slot[off..off + value.len()].copy_from_slice(value);
        Ok(())
    }

    fn lookup_cpu_slot(&self, key: &[u8], cpu: u32) -> Result<Option<Vec<u8>>, Error> {
        if self.def.map_type != MapType::PerCpuHash {
            return Err(Error::NotSupported);
        }
        if cpu >= self.cpus {
            return Err(Error::InvalidArgument);
        }
        let off = cpu as usize * self.def.value_size as usize;
        Ok(self
            .data
            .get(key)
            .map(|v| v[off..off + self.def.value_size as usize].to_vec()))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        self.data.remove(key).map(|_| ()).ok_or(Error::KeyNotFound)
    }
}

/// Global map registry.
static MAP_REGISTRY: Mutex<Vec<Option<MapStorage>>> = Mutex::new(Vec::new());

fn with_map<F, R>(map_fd: u32, func: F) -> Result<R, Error>
where
    F: FnOnce(&mut MapStorage) -> Result<R, Error>,
{
    let mut registry = MAP_REGISTRY.lock();
    let storage = registry
        .get_mut(map_fd as usize)
        .ok_or(Error::NotFound)?
        .as_mut()
        .ok_or(Error::NotFound)?;
    func(storage)
}

/// Create a new map and return its fd.
pub fn create(def: &MapDef) -> Result<u32, Error> {
    if def.key_size == 0 || def.value_size == 0 || def.max_entries == 0 {
        return Err(Error::InvalidArgument);
    }

    let mut registry = MAP_REGISTRY.lock();
    let storage = MapStorage::new(def.clone());

    // Find empty slot or append
    for (i, slot) in registry.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(storage);
            log::debug!("Created map {} with type {:?}", i, def.map_type);
            return Ok(i as u32);
        }
    }

    let fd = registry.len() as u32;
    registry.push(Some(storage));
    log::debug!("Created map {} with type {:?}", fd, def.map_type);
    Ok(fd)
}

/// Lookup an element in a map.
///
/// For `PerCpuHash` maps the returned bytes are the concatenated per-CPU
/// slots in CPU order.
pub fn lookup_elem(map_fd: u32, key: &[u8]) -> Option<Vec<u8>> {
    let registry = MAP_REGISTRY.lock();
    registry.get(map_fd as usize)?.as_ref()?.lookup(key)
}

/// Update an element in a map (create or overwrite).
pub fn update_elem(map_fd: u32, key: &[u8], value: &[u8]) -> Result<(), Error> {
    with_map(map_fd, |storage| storage.update(key, value))
}

/// Update the calling CPU's value slot in a `PerCpuHash` map.
///
/// A missing key is created with all slots zeroed first, so readers summing
/// across CPUs never observe uninitialized slots.
pub fn update_elem_this_cpu(map_fd: u32, key: &[u8], value: &[u8]) -> Result<(), Error> {
    let cpu = platform::cpu_id();
    with_map(map_fd, |storage| storage.update_cpu_slot(key, cpu, value))
}

/// Read the calling CPU's value slot in a `PerCpuHash` map.
pub fn lookup_elem_this_cpu(map_fd: u32, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
    let cpu = platform::cpu_id();
    with_map(map_fd, |storage| storage.lookup_cpu_slot(key, cpu))
}

/// Delete an element from a map.
pub fn delete_elem(map_fd: u32, key: &[u8]) -> Result<(), Error> {
    with_map(map_fd, |storage| storage.delete(key))
}

/// Get map metadata (key_size, value_size) by fd.
pub fn get_map_sizes(map_fd: u32) -> Option<(u32, u32)> {
    let registry = MAP_REGISTRY.lock();
    let map = registry.get(map_fd as usize)?.as_ref()?;
    Some((map.def.key_size, map.def.value_size))
}

/// Get the CPU count captured by a map at creation time.
pub fn get_map_cpus(map_fd: u32) -> Option<u32> {
    let registry = MAP_REGISTRY.lock();
    Some(registry.get(map_fd as usize)?.as_ref()?.cpus)
}

/// Get the number of maps in the registry.
pub fn count() -> usize {
    let registry = MAP_REGISTRY.lock();
    registry.iter().filter(|s| s.is_some()).count()
}

/// Delete a map by fd.
pub fn destroy(map_fd: u32) -> Result<(), Error> {
    let mut registry = MAP_REGISTRY.lock();
    let slot = registry.get_mut(map_fd as usize).ok_or(Error::NotFound)?;
    if slot.is_none() {
        return Err(Error::NotFound);
    }
    *slot = None;
    log::debug!("Destroyed map {}", map_fd);
    Ok(())
}
