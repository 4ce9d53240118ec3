//! Triggering context passed to probe programs.
//!
//! A `ProbeContext` is created once per monitored kernel event and is the
//! only capability a probe program has for observing the triggering task.
//! All reads go through bounded accessors; nothing in a handler chases raw
//! pointers.
//!
//! # Identity word contract
//!
//! The combined identity words follow the kernel helper convention, fixed
//! here once for every call site:
//!
//! - `pid_tgid`: high 32 bits = process identity (TGID, the user-visible
//!   PID), low 32 bits = thread identity.
//! - `uid_gid`: low 32 bits = effective UID, high 32 bits = effective GID.

use core::cell::Cell;

use crate::dispatch::MAX_TAIL_CALLS;
use crate::record::{COMM_CAPACITY, copy_bounded};

/// Current-event context for one probe invocation.
///
/// Probe-side code must treat this as read-only; constructors exist for the
/// event-source boundary and tests.
#[derive(Debug)]
pub struct ProbeContext {
    /// Combined TGID/TID word (see module docs).
    pid_tgid: u64,
    /// Combined GID/UID word (see module docs).
    uid_gid: u64,
    /// Short command name of the triggering task, NUL-padded.
    comm: [u8; COMM_CAPACITY],
    /// Stimulus value used for dispatch (e.g. syscall number).
    opcode: u32,
    /// Remaining tail-jump budget for this invocation.
    tail_budget: Cell<u32>,
}

impl ProbeContext {
    /// Create a context for the given opcode with zeroed task identity.
    pub fn new(opcode: u32) -> Self {
        Self {
            pid_tgid: 0,
            uid_gid: 0,
            comm: [0; COMM_CAPACITY],
            opcode,
            tail_budget: Cell::new(MAX_TAIL_CALLS),
        }
    }

    /// Set process and thread identity.
    pub fn with_task(mut self, pid: u32, tid: u32) -> Self {
        self.pid_tgid = ((pid as u64) << 32) | tid as u64;
        self
    }

    /// Set user and group identity.
    pub fn with_creds(mut self, uid: u32, gid: u32) -> Self {
        self.uid_gid = ((gid as u64) << 32) | uid as u64;
        self
    }

    /// Set the command name, bounded at [`COMM_CAPACITY`].
    pub fn with_comm(mut self, name: &str) -> Self {
        self.comm = [0; COMM_CAPACITY];
        copy_bounded(&mut self.comm, name.as_bytes());
        self
    }

    /// Process identity (TGID, high 32 bits of `pid_tgid`).
    pub fn pid(&self) -> u32 {
        (self.pid_tgid >> 32) as u32
    }

    /// Thread identity (low 32 bits of `pid_tgid`).
    pub fn tid(&self) -> u32 {
        self.pid_tgid as u32
    }

    /// Effective user identity (low 32 bits of `uid_gid`).
    pub fn uid(&self) -> u32 {
        self.uid_gid as u32
    }

    /// Effective group identity (high 32 bits of `uid_gid`).
    pub fn gid(&self) -> u32 {
        (self.uid_gid >> 32) as u32
    }

    /// Stimulus value for dispatch.
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    /// Bounded read of the command name into `dst`.
    ///
    /// Copies at most `min(dst.len(), COMM_CAPACITY)` bytes and returns the
    /// count. This is the only way probe code reads the command name.
    pub fn read_comm(&self, dst: &mut [u8]) -> usize {
        copy_bounded(dst, &self.comm)
    }

    /// Consume one tail-jump attempt; `false` when the budget is exhausted.
    pub(crate) fn take_tail_jump(&self) -> bool {
        let left = self.tail_budget.get();
        if left == 0 {
            return false;
        }
        self.tail_budget.set(left - 1);
        true
    }
}
