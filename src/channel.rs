//! Transport channel abstraction.
//!
//! One `Channel` interface with three interchangeable strategies, selected
//! via configuration instead of forking the program:
//!
//! - [`ChannelKind::TracePipe`]: format-and-emit text lines, best-effort.
//! - [`ChannelKind::PerCpuBuffer`]: per-CPU staging queues with a lost-event
//!   counter, drained in CPU scan order.
//! - [`ChannelKind::RingBuf`]: one lock-free multi-producer ring, drained in
//!   submission order; drops silently when full.
//!
//! Producers call `publish` from the probe path (non-blocking, bounded).
//! The consumer registers a callback at open time and drives `poll` from a
//! single control thread; callbacks run synchronously on that thread and
//! must not block indefinitely.
//!
//! Channel lifecycle: construction is the Uninitialized→Open transition;
//! the first `poll` moves Open→Polling (exactly once); `close` is terminal.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::perf_buffer::PerCpuBufferChannel;
use crate::record::EventRecord;
use crate::ringbuf::RingBufChannel;
use crate::trace_pipe::TracePipeChannel;

/// Transport strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Debug-log text lines. Always available, unstructured, lossy.
    TracePipe,
    /// Per-CPU buffered event stream with lost-event accounting.
    PerCpuBuffer,
    /// Lock-free shared ring. Preferred when available; no drop accounting.
    RingBuf,
}

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Constructed, callback registered, no poll yet.
    Open,
    /// The consumer loop has started draining. Terminal steady state.
    Polling,
    /// Released; publish and poll are refused.
    Closed,
}

/// Error types for channel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Ring capacity must be a non-zero power of two.
    InvalidCapacity(usize),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidCapacity(n) => {
                write!(f, "Ring capacity must be a non-zero power of two, got {}", n)
            }
        }
    }
}

impl core::error::Error for Error {}

/// One delivered item, as decoded on the consumer side.
///
/// Structured strategies deliver decoded records; the trace pipe can only
/// deliver the formatted text line it carried.
#[derive(Debug)]
pub enum Delivery<'a> {
    /// A decoded event record (per-CPU buffer and ring strategies).
    Record(&'a EventRecord),
    /// A raw text line (trace-pipe strategy).
    Line(&'a str),
}

/// Consumer callback: `(source_cpu, delivery)`.
///
/// Runs synchronously on the polling thread, one invocation at a time.
pub type EventCallback = Box<dyn FnMut(u32, Delivery<'_>) + Send>;

/// Lost-event callback: `(cpu, lost_count)` (per-CPU buffer strategy only).
pub type LostCallback = Box<dyn FnMut(u32, u64) + Send>;

/// Capacity configuration for the transport strategies.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Ring capacity in records; must be a non-zero power of two.
    pub ring_capacity: usize,
    /// Staging capacity per CPU, in records.
    pub per_cpu_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1024,
            per_cpu_capacity: 256,
        }
    }
}

/// Unified publish/consume interface over the three strategies.
pub trait Channel: Send + Sync {
    /// Which strategy this channel uses.
    fn kind(&self) -> ChannelKind;

    /// Current lifecycle state.
    fn state(&self) -> ChannelState;

    /// Producer side: push one record, non-blocking.
    ///
    /// Returns `false` when the record was dropped (channel full or closed).
    /// Drop is acceptable degradation under load, never an unwind.
    fn publish(&self, record: &EventRecord) -> bool;

    /// Consumer side: drain available items, invoking the registered
    /// callback once per item. Returns the number delivered.
    fn poll(&self) -> usize;

    /// Release the channel. Idempotent; later publishes and polls refuse.
    fn close(&self);
}

/// Open a channel of the given kind with a consumer callback.
pub fn open(
    kind: ChannelKind,
    config: &ChannelConfig,
    callback: EventCallback,
) -> Result<Box<dyn Channel>, Error> {
    open_with_lost(kind, config, callback, None)
}

/// Open a channel with an additional lost-event callback.
///
/// The lost callback only fires for the per-CPU buffer strategy; the ring
/// drops silently and the trace pipe only counts globally.
pub fn open_with_lost(
    kind: ChannelKind,
    config: &ChannelConfig,
    callback: EventCallback,
    lost: Option<LostCallback>,
) -> Result<Box<dyn Channel>, Error> {
    let channel: Box<dyn Channel> = match kind {
        ChannelKind::TracePipe => Box::new(TracePipeChannel::new(callback)),
        ChannelKind::PerCpuBuffer => Box::new(PerCpuBufferChannel::new(
            config.per_cpu_capacity,
            callback,
            lost,
        )),
        ChannelKind::RingBuf => Box::new(RingBufChannel::new(config.ring_capacity, callback)?),
    };
    log::debug!("Opened {:?} channel", kind);
    Ok(channel)
}

// =============================================================================
// Shared lifecycle cell
// =============================================================================

const STATE_OPEN: u8 = 0;
const STATE_POLLING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Atomic lifecycle state shared by the channel implementations.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn open() -> Self {
        Self(AtomicU8::new(STATE_OPEN))
    }

    pub(crate) fn get(&self) -> ChannelState {
        match self.0.load(Ordering::Acquire) {
            STATE_OPEN => ChannelState::Open,
            STATE_POLLING => ChannelState::Polling,
            _ => ChannelState::Closed,
        }
    }

    /// Producers may publish while Open or Polling.
    pub(crate) fn accepts_publish(&self) -> bool {
        self.0.load(Ordering::Acquire) != STATE_CLOSED
    }

    /// Record the single Open→Polling transition; `false` once closed.
    pub(crate) fn enter_polling(&self) -> bool {
        let _ = self.0.compare_exchange(
            STATE_OPEN,
            STATE_POLLING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.0.load(Ordering::Acquire) == STATE_POLLING
    }

    pub(crate) fn close(&self) {
        self.0.store(STATE_CLOSED, Ordering::Release);
    }
}
