//! Loadable probe program units.
//!
//! A `ProgramObject` is the output of the external compile-and-load
//! collaborator: a named unit exposing named entry points. Loading runs a
//! verification pass and registers the object; entry points are then handed
//! out as opaque [`HandlerRef`]s, the only value a dispatch slot or hook
//! attachment accepts.
//!
//! The [`ProbeProgram`] trait is the restricted-execution seam: a handler
//! runs once per triggering event, in bounded time, without blocking, and
//! observes the event only through [`ProbeContext`] accessors. Code that
//! needs anything more does not belong behind this trait.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::context::ProbeContext;
use crate::record::EVENT_RECORD_SIZE;

/// A unit of probe-side logic, runnable once per triggering event.
pub trait ProbeProgram: Send + Sync {
    /// Handle one event. Must be non-blocking and bounded-time.
    fn run(&self, ctx: &ProbeContext) -> u32;
}

/// Opaque reference to a loaded entry point.
///
/// Obtained from [`handler`]; valid for the lifetime of the session even if
/// the originating object is unloaded (installed slots keep the program
/// alive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerRef(u32);

/// Error types for program loading.
#[derive(Debug, Clone)]
pub enum LoadError {
    /// Object declares no entry points.
    NoEntryPoints(String),
    /// Two entry points share a name.
    DuplicateEntry { object: String, entry: String },
    /// Object's declared emit size does not match the event record layout.
    EmitSizeMismatch {
        object: String,
        declared: usize,
        expected: usize,
    },
    /// Object id not present in the registry.
    ObjectNotFound(u32),
    /// Entry point name not exposed by the object.
    EntryNotFound { object: String, entry: String },
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoEntryPoints(name) => {
                write!(f, "Program object '{}' has no entry points", name)
            }
            Self::DuplicateEntry { object, entry } => {
                write!(f, "Program object '{}' declares entry '{}' twice", object, entry)
            }
            Self::EmitSizeMismatch {
                object,
                declared,
                expected,
            } => write!(
                f,
                "Program object '{}' declares emit size {} but the event record is {} bytes",
                object, declared, expected
            ),
            Self::ObjectNotFound(id) => write!(f, "Program object not found: {}", id),
            Self::EntryNotFound { object, entry } => {
                write!(f, "Entry point '{}' not found in object '{}'", entry, object)
            }
        }
    }
}

impl core::error::Error for LoadError {}

/// A compiled unit handed over by the loader collaborator.
pub struct ProgramObject {
    name: String,
    emit_size: Option<usize>,
    entries: Vec<(String, Arc<dyn ProbeProgram>)>,
}

impl ProgramObject {
    /// Start an object definition.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            emit_size: None,
            entries: Vec::new(),
        }
    }

    /// Declare the byte size of the records this object emits.
    ///
    /// Checked against [`EVENT_RECORD_SIZE`] at load time; a mismatch means
    /// producer and consumer would disagree on the wire layout.
    pub fn declares_emit(mut self, size: usize) -> Self {
        self.emit_size = Some(size);
        self
    }

    /// Add a named entry point.
    pub fn entry(mut self, name: &str, program: Arc<dyn ProbeProgram>) -> Self {
        self.entries.push((name.to_string(), program));
        self
    }
}

/// A verified, registered object.
struct LoadedObject {
    name: String,
    entries: Vec<(String, Arc<dyn ProbeProgram>)>,
}

/// Global object registry.
static OBJECTS: Mutex<Vec<Option<LoadedObject>>> = Mutex::new(Vec::new());

/// Flat handler table backing [`HandlerRef`]s.
static HANDLERS: Mutex<Vec<Arc<dyn ProbeProgram>>> = Mutex::new(Vec::new());

/// Verify and register a program object.
///
/// Verification is the stand-in for the external safety checker: the object
/// must expose at least one uniquely named entry point, and its declared
/// emit size (if any) must match the shared record layout. Failures carry a
/// diagnostic and are expected to be fatal at startup.
pub fn load(object: ProgramObject) -> Result<u32, LoadError> {
    if object.entries.is_empty() {
        return Err(LoadError::NoEntryPoints(object.name));
    }

    for (i, (name, _)) in object.entries.iter().enumerate() {
        if object.entries[..i].iter().any(|(other, _)| other == name) {
            return Err(LoadError::DuplicateEntry {
                object: object.name,
                entry: name.clone(),
            });
        }
    }

    if let Some(declared) = object.emit_size
        && declared != EVENT_RECORD_SIZE
    {
        return Err(LoadError::EmitSizeMismatch {
            object: object.name,
            declared,
            expected: EVENT_RECORD_SIZE,
        });
    }

    let loaded = LoadedObject {
        name: object.name,
        entries: object.entries,
    };

    let mut registry = OBJECTS.lock();

    // Find empty slot or append
    for (i, slot) in registry.iter_mut().enumerate() {
        if slot.is_none() {
            log::debug!("Loaded object '{}' as id {}", loaded.name, i);
            *slot = Some(loaded);
            return Ok(i as u32);
        }
    }

    let id = registry.len() as u32;
    log::debug!("Loaded object '{}' as id {}", loaded.name, id);
    registry.push(Some(loaded));
    Ok(id)
}

/// Resolve an entry point to an opaque handler reference.
pub fn handler(object_id: u32, entry: &str) -> Result<HandlerRef, LoadError> {
    let registry = OBJECTS.lock();
    let object = registry
        .get(object_id as usize)
        .and_then(|slot| slot.as_ref())
        .ok_or(LoadError::ObjectNotFound(object_id))?;

    let program = object
        .entries
        .iter()
        .find(|(name, _)| name == entry)
        .map(|(_, program)| program.clone())
        .ok_or_else(|| LoadError::EntryNotFound {
            object: object.name.clone(),
            entry: entry.to_string(),
        })?;

    let mut handlers = HANDLERS.lock();
    let id = handlers.len() as u32;
    handlers.push(program);
    Ok(HandlerRef(id))
}

/// Whether a handler reference resolves to a registered program.
pub fn handler_exists(handler: HandlerRef) -> bool {
    let handlers = HANDLERS.lock();
    (handler.0 as usize) < handlers.len()
}

/// Run a handler for one event; `None` when the reference is dangling.
pub fn run_handler(handler: HandlerRef, ctx: &ProbeContext) -> Option<u32> {
    let program = {
        let handlers = HANDLERS.lock();
        handlers.get(handler.0 as usize).cloned()
    };
    // The registry lock is dropped before the handler runs; a handler can
    // resolve further handlers without deadlocking.
    program.map(|p| p.run(ctx))
}

/// Unload an object. Already-resolved handler references stay valid.
pub fn unload(object_id: u32) -> Result<(), LoadError> {
    let mut registry = OBJECTS.lock();
    let slot = registry
        .get_mut(object_id as usize)
        .ok_or(LoadError::ObjectNotFound(object_id))?;
    if slot.is_none() {
        return Err(LoadError::ObjectNotFound(object_id));
    }
    *slot = None;
    log::debug!("Unloaded object {}", object_id);
    Ok(())
}

/// Get the number of loaded objects.
pub fn object_count() -> usize {
    let registry = OBJECTS.lock();
    registry.iter().filter(|s| s.is_some()).count()
}
