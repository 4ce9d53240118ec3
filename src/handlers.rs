//! Built-in probe programs.
//!
//! The stock handlers that ship with the toolkit, each a small
//! [`ProbeProgram`] with one job. `HelloProgram` builds the full event
//! record and publishes it through a transport channel; the opcode-specific
//! loggers go straight to the trace pipe; the counter programs bump a
//! per-UID store; `SyscallEntryProgram` is the dispatch entry point that
//! routes by opcode and handles fallthrough.

use alloc::sync::Arc;

use crate::channel::Channel;
use crate::config::{CounterStore, MessageStore, PerCpuCounterStore};
use crate::context::ProbeContext;
use crate::dispatch::{DispatchTable, TailCall};
use crate::program::{ProbeProgram, ProgramObject};
use crate::record::{COMM_CAPACITY, EVENT_RECORD_SIZE, EventRecord};
use crate::trace_pipe;

/// Builds an event record from the triggering context and publishes it.
///
/// The message field comes from the per-UID store, falling back to the
/// default. A refused publish is tolerated; the probe path never unwinds.
pub struct HelloProgram {
    channel: Arc<dyn Channel>,
    messages: MessageStore,
}

impl HelloProgram {
    pub fn new(channel: Arc<dyn Channel>, messages: MessageStore) -> Self {
        Self { channel, messages }
    }
}

impl ProbeProgram for HelloProgram {
    fn run(&self, ctx: &ProbeContext) -> u32 {
        let mut record = EventRecord::zeroed();
        record.pid = ctx.pid() as i32;
        record.uid = ctx.uid() as i32;

        let mut comm = [0u8; COMM_CAPACITY];
        ctx.read_comm(&mut comm);
        record.set_command(&comm);
        record.set_message(&self.messages.lookup_or_default(ctx.uid()));

        self.channel.publish(&record);
        0
    }
}

/// Logs program-execution events to the trace pipe.
pub struct ExecLogProgram;

impl ProbeProgram for ExecLogProgram {
    fn run(&self, _ctx: &ProbeContext) -> u32 {
        trace_pipe::emit(format_args!("Executing a program"));
        0
    }
}

/// Logs timer-related events to the trace pipe.
pub struct TimerLogProgram;

impl ProbeProgram for TimerLogProgram {
    fn run(&self, _ctx: &ProbeContext) -> u32 {
        trace_pipe::emit(format_args!("Timer operation"));
        0
    }
}

/// Deliberately-silent handler for opcodes nobody cares about.
pub struct IgnoreProgram;

impl ProbeProgram for IgnoreProgram {
    fn run(&self, _ctx: &ProbeContext) -> u32 {
        0
    }
}

enum CounterVariant {
    Plain(CounterStore),
    PerCpu(PerCpuCounterStore),
}

/// Bumps a per-UID counter on every triggering event.
pub struct CountByUidProgram {
    counters: CounterVariant,
}

impl CountByUidProgram {
    /// Count with the plain store (lost updates possible under contention).
    pub fn new(counters: CounterStore) -> Self {
        Self {
            counters: CounterVariant::Plain(counters),
        }
    }

    /// Count with CPU-sharded slots (exact under contention).
    pub fn per_cpu(counters: PerCpuCounterStore) -> Self {
        Self {
            counters: CounterVariant::PerCpu(counters),
        }
    }
}

impl ProbeProgram for CountByUidProgram {
    fn run(&self, ctx: &ProbeContext) -> u32 {
        let result = match &self.counters {
            CounterVariant::Plain(store) => store.bump(ctx.uid()),
            CounterVariant::PerCpu(store) => store.bump(ctx.uid()),
        };
        if let Err(err) = result {
            log::warn!("counter bump failed for uid {}: {}", ctx.uid(), err);
        }
        0
    }
}

/// Entry-point program routing events through a dispatch table.
///
/// Reads the opcode from the context and attempts a tail transfer. On
/// fallthrough the opcode is logged to the trace pipe so unrouted events
/// stay visible rather than vanishing.
pub struct SyscallEntryProgram {
    table: Arc<DispatchTable>,
}

impl SyscallEntryProgram {
    pub fn new(table: Arc<DispatchTable>) -> Self {
        Self { table }
    }
}

impl ProbeProgram for SyscallEntryProgram {
    fn run(&self, ctx: &ProbeContext) -> u32 {
        match self.table.tail_call(ctx, ctx.opcode()) {
            TailCall::Jumped(ret) => ret,
            TailCall::Fallthrough => {
                trace_pipe::emit(format_args!("Another syscall: {}", ctx.opcode()));
                0
            }
        }
    }
}

/// Assemble the stock object: `hello`, `exec_log`, `timer_log`, `ignore`.
///
/// Declares the emit size so loading verifies the record layout agreement.
pub fn hello_object(channel: Arc<dyn Channel>, messages: MessageStore) -> ProgramObject {
    ProgramObject::new("hello")
        .declares_emit(EVENT_RECORD_SIZE)
        .entry("hello", Arc::new(HelloProgram::new(channel, messages)))
        .entry("exec_log", Arc::new(ExecLogProgram))
        .entry("timer_log", Arc::new(TimerLogProgram))
        .entry("ignore", Arc::new(IgnoreProgram))
}
