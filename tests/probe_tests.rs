//! Integration tests for the probe controller and full sessions.
//!
//! Tests hook attachment, handle lifetimes, and complete fire-to-display
//! pipelines through the stock handlers.

use std::sync::{Arc, Mutex};
use std::thread;

use kobserve::channel::{self, Channel, ChannelConfig, ChannelKind, Delivery};
use kobserve::collector::{self, CancelToken};
use kobserve::config::{CounterStore, MessageStore};
use kobserve::context::ProbeContext;
use kobserve::dispatch::DispatchTable;
use kobserve::handlers::{self, CountByUidProgram, ExecLogProgram, IgnoreProgram, SyscallEntryProgram};
use kobserve::probe::{self, Error};
use kobserve::program::{self, ProbeProgram, ProgramObject};
use kobserve::trace_pipe;

/// Does nothing; exists to have something attachable.
struct Nop;

impl ProbeProgram for Nop {
    fn run(&self, _ctx: &ProbeContext) -> u32 {
        0
    }
}

fn nop_handler() -> program::HandlerRef {
    let object = program::load(ProgramObject::new("nop").entry("nop", Arc::new(Nop))).unwrap();
    program::handler(object, "nop").unwrap()
}

// =============================================================================
// Attach Tests
// =============================================================================

#[test]
fn test_attach_unknown_hook_fails() {
    let result = probe::attach("kprobe:no_such_symbol", nop_handler());
    assert!(matches!(result, Err(Error::HookNotFound(_))));
}

#[test]
fn test_attach_malformed_name_fails() {
    let result = probe::attach("nocolon", nop_handler());
    assert!(matches!(result, Err(Error::InvalidName(_))));
}

#[test]
fn test_attach_twice_fails() {
    let hook = "kprobe:sys_sync";
    let _handle = probe::attach(hook, nop_handler()).unwrap();
    assert!(matches!(
        probe::attach(hook, nop_handler()),
        Err(Error::AlreadyAttached(_))
    ));
}

#[test]
fn test_handle_drop_detaches() {
    let hook = "kprobe:do_nanosleep";
    {
        let _handle = probe::attach(hook, nop_handler()).unwrap();
        assert!(probe::is_attached(hook));
    }
    assert!(!probe::is_attached(hook));
}

#[test]
fn test_explicit_detach() {
    let hook = "raw_tp:sys_enter";
    let handle = probe::attach(hook, nop_handler()).unwrap();
    handle.detach().unwrap();
    assert!(!probe::is_attached(hook));
}

#[test]
fn test_fire_unattached_hook_is_none() {
    let ctx = ProbeContext::new(0);
    assert!(probe::fire("tracepoint:syscalls:sys_enter_openat", &ctx).is_none());
}

// =============================================================================
// End-To-End Session Tests
// =============================================================================

#[test]
fn test_fire_to_display_pipeline() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let lines_cb = lines.clone();
    let ch: Arc<dyn Channel> = Arc::from(
        channel::open(
            ChannelKind::RingBuf,
            &ChannelConfig::default(),
            Box::new(move |_cpu, delivery| {
                if let Delivery::Record(rec) = delivery {
                    lines_cb.lock().unwrap().push(format!("{}", rec));
                }
            }),
        )
        .unwrap(),
    );

    let messages = MessageStore::new().unwrap();
    messages.upsert(0, b"Hey root!").unwrap();
    messages.upsert(501, b"Hi user 501!").unwrap();

    let object = program::load(handlers::hello_object(ch.clone(), messages)).unwrap();
    let hello = program::handler(object, "hello").unwrap();
    let handle = probe::attach("kprobe:sys_execve", hello).unwrap();

    for (pid, uid, comm) in [(100u32, 0u32, "cron"), (200, 501, "bash"), (300, 42, "cat")] {
        let ctx = ProbeContext::new(59)
            .with_task(pid, pid)
            .with_creds(uid, uid)
            .with_comm(comm);
        assert_eq!(probe::fire("kprobe:sys_execve", &ctx), Some(0));
    }

    ch.poll();
    let lines = lines.lock().unwrap();
    assert_eq!(
        lines.as_slice(),
        &[
            "100 0 cron Hey root!",
            "200 501 bash Hi user 501!",
            "300 42 cat Hello World",
        ]
    );
    drop(lines);
    handle.detach().unwrap();
}

#[test]
fn test_dispatch_entry_through_hook() {
    let mut table = DispatchTable::new(500);

    let object = program::load(
        ProgramObject::new("routed")
            .entry("ignore", Arc::new(IgnoreProgram))
            .entry("exec_log", Arc::new(ExecLogProgram)),
    )
    .unwrap();
    table
        .fill_default(program::handler(object, "ignore").unwrap())
        .unwrap();
    table
        .install(59, program::handler(object, "exec_log").unwrap())
        .unwrap();
    table.activate().unwrap();

    let entry = program::load(
        ProgramObject::new("entry").entry(
            "main",
            Arc::new(SyscallEntryProgram::new(Arc::new(table))),
        ),
    )
    .unwrap();
    let main = program::handler(entry, "main").unwrap();
    let handle = probe::attach("tracepoint:syscalls:sys_enter_execve", main).unwrap();

    // Routed opcode, defaulted opcode, and one past the table's range.
    for opcode in [59, 7, 999] {
        let ctx = ProbeContext::new(opcode);
        probe::fire("tracepoint:syscalls:sys_enter_execve", &ctx);
    }

    let lines = trace_pipe::drain(0);
    assert!(lines.iter().any(|l| l == "Executing a program"));
    assert!(lines.iter().any(|l| l == "Another syscall: 999"));
    assert!(!lines.iter().any(|l| l.contains("syscall: 7")));
    handle.detach().unwrap();
}

#[test]
fn test_count_by_uid_program() {
    let counters = CounterStore::new().unwrap();
    let object = program::load(
        ProgramObject::new("counting")
            .entry("count", Arc::new(CountByUidProgram::new(counters))),
    )
    .unwrap();
    let count = program::handler(object, "count").unwrap();

    for uid in [1000, 1000, 1000, 2000] {
        let ctx = ProbeContext::new(0).with_creds(uid, uid);
        assert_eq!(program::run_handler(count, &ctx), Some(0));
    }
    assert_eq!(counters.get(1000), 3);
    assert_eq!(counters.get(2000), 1);
    assert_eq!(counters.get(3000), 0);
}

// =============================================================================
// Collector Tests
// =============================================================================

#[test]
fn test_poll_loop_stops_on_cancel_and_closes() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let ch: Arc<dyn Channel> = Arc::from(
        channel::open(
            ChannelKind::RingBuf,
            &ChannelConfig::default(),
            Box::new(move |_cpu, delivery| {
                if let Delivery::Record(rec) = delivery {
                    seen_cb.lock().unwrap().push(rec.pid);
                }
            }),
        )
        .unwrap(),
    );

    let token = CancelToken::new();
    let loop_ch = ch.clone();
    let loop_token = token.clone();
    let worker = thread::spawn(move || collector::run_poll_loop(loop_ch.as_ref(), &loop_token));

    let mut rec = kobserve::record::EventRecord::zeroed();
    rec.pid = 7;
    assert!(ch.publish(&rec));

    // Wait for the loop to pick the record up, then cancel.
    while seen.lock().unwrap().is_empty() {
        thread::yield_now();
    }
    token.cancel();
    let delivered = worker.join().unwrap();

    assert!(delivered >= 1);
    assert_eq!(ch.state(), channel::ChannelState::Closed);
    assert!(!ch.publish(&rec));
}
