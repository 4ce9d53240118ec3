//! Kernel-Event Observation Toolkit
//!
//! This crate provides the building blocks of a probe-based observation
//! session: a fixed-layout event record shared between probe and control
//! sides, interchangeable transport channels, an opcode-indexed dispatch
//! table with tail-style handler transfer, per-identity configuration and
//! counter stores, and a probe controller binding handlers to hook points.
//!
//! # Quick Start
//!
//! ```ignore
//! use alloc::sync::Arc;
//! use kobserve::channel::{self, ChannelConfig, ChannelKind};
//! use kobserve::{collector, config, handlers, probe, program};
//!
//! kobserve::init();
//!
//! // Open a transport channel with a display callback.
//! let channel: Arc<dyn channel::Channel> = Arc::from(channel::open(
//!     ChannelKind::PerCpuBuffer,
//!     &ChannelConfig::default(),
//!     collector::display_callback(),
//! )?);
//!
//! // Seed the per-UID message store and load the stock handlers.
//! let messages = config::MessageStore::new()?;
//! messages.upsert(0, b"Hey root!")?;
//! let object = program::load(handlers::hello_object(channel.clone(), messages))?;
//! let hello = program::handler(object, "hello")?;
//!
//! // Attach and collect until cancelled.
//! let _handle = probe::attach("kprobe:sys_execve", hello)?;
//! ```

#![no_std]

extern crate alloc;

#[macro_use]
extern crate log;

// =============================================================================
// Platform Abstraction (for testing support)
// =============================================================================

pub mod platform;

// =============================================================================
// Event Records and Stores
// =============================================================================

pub mod config;

pub mod maps;

pub mod record;

// =============================================================================
// Transport Channels
// =============================================================================

pub mod channel;

pub mod perf_buffer;

pub mod ringbuf;

pub mod trace_pipe;

// =============================================================================
// Programs and Dispatch
// =============================================================================

pub mod context;

pub mod dispatch;

pub mod handlers;

pub mod program;

// =============================================================================
// Control Side
// =============================================================================

pub mod collector;

pub mod probe;

// Re-export key types for convenience
pub use channel::{Channel, ChannelConfig, ChannelKind, ChannelState, Delivery};

pub use collector::CancelToken;

pub use config::{CounterStore, MessageStore, PerCpuCounterStore};

pub use context::ProbeContext;

pub use dispatch::{DispatchTable, MAX_TAIL_CALLS, TailCall};

pub use maps::{Error as MapError, MapDef, MapType};

pub use probe::AttachHandle;

pub use program::{HandlerRef, LoadError, ProbeProgram, ProgramObject};

pub use record::{
    COMM_CAPACITY, CONFIG_VALUE_CAPACITY, EVENT_RECORD_SIZE, EventRecord, MESSAGE_CAPACITY,
};

// =============================================================================
// Initialization
// =============================================================================

/// Initialize the toolkit.
///
/// Call once during startup after the allocator is ready. Safe to call
/// before any channel, store, or table is created.
pub fn init() {
    info!("Initializing kobserve...");
    info!("  - event record: {} bytes", record::EVENT_RECORD_SIZE);
    info!("  - transports: trace_pipe, per-CPU buffer, ring buffer");
    info!("  - dispatch: tail-jump budget {}", dispatch::MAX_TAIL_CALLS);
    info!("kobserve initialization complete");
}
