//! Debug-log transport: the trace pipe.
//!
//! The simplest and always-available strategy. Probe-side code formats a
//! short text line into a single global pipe; the control side drains and
//! prints the feed. Lines are size-limited, the pipe is capacity-bounded
//! and drops under load, and nothing beyond per-line atomicity is
//! guaranteed. Unsuitable for structured or high-volume data; that is what
//! the buffered and ring strategies are for.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::channel::{Channel, ChannelKind, ChannelState, Delivery, EventCallback, StateCell};
use crate::record::EventRecord;

/// Maximum length of one trace line in bytes; longer lines are truncated.
pub const TRACE_LINE_CAPACITY: usize = 128;

/// Number of lines the pipe holds before dropping (number of events).
const TRACE_PIPE_CAPACITY: usize = 1024;

/// Global trace pipe for formatted probe output.
static TRACE_PIPE: Mutex<VecDeque<String>> = Mutex::new(VecDeque::new());

/// Lines dropped because the pipe was full.
static DROPPED_LINES: AtomicU64 = AtomicU64::new(0);

/// Format and emit one line into the trace pipe.
///
/// Probe-path safe: bounded formatting, spinlock push, drop-on-full.
/// Returns `false` when the line was dropped.
pub fn emit(args: core::fmt::Arguments<'_>) -> bool {
    let mut line = alloc::format!("{}", args);
    if line.len() > TRACE_LINE_CAPACITY {
        let mut end = TRACE_LINE_CAPACITY;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        line.truncate(end);
    }

    let mut pipe = TRACE_PIPE.lock();
    if pipe.len() >= TRACE_PIPE_CAPACITY {
        DROPPED_LINES.fetch_add(1, Ordering::Relaxed);
        return false;
    }
    pipe.push_back(line);
    true
}

/// Drain up to `max` lines from the pipe (`0` means no limit).
pub fn drain(max: usize) -> Vec<String> {
    let limit = if max == 0 { usize::MAX } else { max };
    let mut pipe = TRACE_PIPE.lock();
    let mut out = Vec::new();

    while out.len() < limit {
        match pipe.pop_front() {
            Some(line) => out.push(line),
            None => break,
        }
    }
    out
}

/// Total lines dropped since startup.
pub fn dropped_lines() -> u64 {
    DROPPED_LINES.load(Ordering::Relaxed)
}

/// Channel adapter over the global trace pipe.
///
/// `publish` renders the record as its display line; the structured fields
/// do not survive the trip. All trace-pipe channels share the one global
/// pipe, mirroring the single kernel trace feed.
pub struct TracePipeChannel {
    state: StateCell,
    callback: Mutex<EventCallback>,
}

impl TracePipeChannel {
    pub(crate) fn new(callback: EventCallback) -> Self {
        Self {
            state: StateCell::open(),
            callback: Mutex::new(callback),
        }
    }
}

impl Channel for TracePipeChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::TracePipe
    }

    fn state(&self) -> ChannelState {
        self.state.get()
    }

    fn publish(&self, record: &EventRecord) -> bool {
        if !self.state.accepts_publish() {
            return false;
        }
        emit(format_args!("{}", record))
    }

    fn poll(&self) -> usize {
        if !self.state.enter_polling() {
            return 0;
        }

        let lines = drain(0);
        let mut callback = self.callback.lock();
        for line in &lines {
            callback(0, Delivery::Line(line));
        }
        lines.len()
    }

    fn close(&self) {
        self.state.close();
    }
}
