//! Indexed dispatch table with tail-style handler transfer.
//!
//! A dense table maps event opcodes to handler references. The hot path is
//! `tail_call`: one bounds check, one slot load, one jump counter decrement,
//! then control transfers to the installed handler and does not return to
//! the caller's own logic. A missed transfer (out of range, empty slot,
//! budget exhausted) falls through to the caller, which must handle it
//! explicitly; fallthrough is an expected outcome, not an error.
//!
//! Tables are built in a staged sequence: size the table, fill every slot
//! with a default handler, overwrite the specialized slots, then activate.
//! Defaulting before specializing means no opcode in range is ever unhandled
//! once the table is live.

use alloc::vec;
use alloc::vec::Vec;

use crate::context::ProbeContext;
use crate::program::{self, HandlerRef};

/// Maximum chained handler transfers for one triggering event.
pub const MAX_TAIL_CALLS: u32 = 33;

/// Build lifecycle of a dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// Sized, all slots empty.
    Built,
    /// Every slot holds the default handler.
    Defaulted,
    /// Specialized slots overwritten; rest still default.
    Specialized,
    /// Live; no further installs.
    Active,
}

/// Error types for dispatch table construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Operation not valid in the table's current build state.
    InvalidState(TableState),
    /// Opcode outside the table's index range.
    OpcodeOutOfBounds { opcode: u32, size: u32 },
    /// Handler reference does not resolve to a loaded program.
    UnknownHandler,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidState(state) => {
                write!(f, "Operation not valid in table state {:?}", state)
            }
            Self::OpcodeOutOfBounds { opcode, size } => {
                write!(f, "Opcode {} out of bounds for table of size {}", opcode, size)
            }
            Self::UnknownHandler => write!(f, "Handler reference is not loaded"),
        }
    }
}

impl core::error::Error for Error {}

/// Outcome of a dispatch attempt.
///
/// Callers must branch on this; a `Fallthrough` left unhandled means the
/// triggering event is silently lost.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailCall {
    /// Control transferred; carries the handler's return value.
    Jumped(u32),
    /// No transfer happened. Execution continues in the caller.
    Fallthrough,
}

/// Dense opcode-indexed handler table.
pub struct DispatchTable {
    slots: Vec<Option<HandlerRef>>,
    state: TableState,
}

impl DispatchTable {
    /// Create an empty table with `size` slots.
    pub fn new(size: u32) -> Self {
        Self {
            slots: vec![None; size as usize],
            state: TableState::Built,
        }
    }

    /// Get the number of slots.
    pub fn size(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Current build state.
    pub fn state(&self) -> TableState {
        self.state
    }

    /// Fill every slot with the default handler. Valid exactly once, on a
    /// freshly built table.
    pub fn fill_default(&mut self, handler: HandlerRef) -> Result<(), Error> {
        if self.state != TableState::Built {
            return Err(Error::InvalidState(self.state));
        }
        if !program::handler_exists(handler) {
            return Err(Error::UnknownHandler);
        }
        for slot in &mut self.slots {
            *slot = Some(handler);
        }
        self.state = TableState::Defaulted;
        Ok(())
    }

    /// Overwrite one slot with a specialized handler.
    ///
    /// Requires the table to be defaulted first; an install is a pure
    /// overwrite and never leaves a hole.
    pub fn install(&mut self, opcode: u32, handler: HandlerRef) -> Result<(), Error> {
        match self.state {
            TableState::Defaulted | TableState::Specialized => {}
            other => return Err(Error::InvalidState(other)),
        }
        if !program::handler_exists(handler) {
            return Err(Error::UnknownHandler);
        }
        let size = self.size();
        let slot = self
            .slots
            .get_mut(opcode as usize)
            .ok_or(Error::OpcodeOutOfBounds { opcode, size })?;
        *slot = Some(handler);
        self.state = TableState::Specialized;
        Ok(())
    }

    /// Freeze the table and make it dispatchable.
    pub fn activate(&mut self) -> Result<(), Error> {
        match self.state {
            TableState::Defaulted | TableState::Specialized => {
                self.state = TableState::Active;
                log::debug!("Dispatch table activated with {} slots", self.size());
                Ok(())
            }
            other => Err(Error::InvalidState(other)),
        }
    }

    /// Attempt a handler transfer for `opcode`.
    ///
    /// Falls through when the opcode is out of range, the slot is empty, the
    /// table is not active, or the context's jump budget is exhausted. The
    /// bounds check happens before any slot access.
    pub fn tail_call(&self, ctx: &ProbeContext, opcode: u32) -> TailCall {
        if self.state != TableState::Active {
            return TailCall::Fallthrough;
        }

        let Some(slot) = self.slots.get(opcode as usize) else {
            return TailCall::Fallthrough;
        };
        let Some(handler) = *slot else {
            return TailCall::Fallthrough;
        };

        if !ctx.take_tail_jump() {
            // Budget exhausted: the chain ends here for this event.
            return TailCall::Fallthrough;
        }

        match program::run_handler(handler, ctx) {
            Some(ret) => TailCall::Jumped(ret),
            None => TailCall::Fallthrough,
        }
    }
}
