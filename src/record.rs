//! Fixed-layout event record codec.
//!
//! The `EventRecord` is the unit transported from probe context to consumer.
//! Both sides interpret the same `#[repr(C)]` layout, so the encoded block is
//! identical to the in-memory struct. Every fixed-capacity field is a named
//! constant shared by encode and decode; capacity relationships are checked
//! at compile time instead of relying on silent truncation.

/// Kernel short-name limit for task command names (TASK_COMM_LEN).
pub const COMM_CAPACITY: usize = 16;

/// Capacity of the per-event display message ("Hello World" + NUL).
pub const MESSAGE_CAPACITY: usize = 12;

/// Capacity of a config store value.
///
/// Must never exceed [`MESSAGE_CAPACITY`]: a config value is copied into the
/// event message field, and the copy bound is the smaller of the two
/// capacities. Declaring them equal removes the truncation hazard entirely.
pub const CONFIG_VALUE_CAPACITY: usize = 12;

/// Message used when the config store has no entry for a key.
pub const DEFAULT_MESSAGE: &[u8] = b"Hello World";

const _: () = assert!(CONFIG_VALUE_CAPACITY <= MESSAGE_CAPACITY);
const _: () = assert!(DEFAULT_MESSAGE.len() < MESSAGE_CAPACITY);

/// Size in bytes of one encoded event record.
pub const EVENT_RECORD_SIZE: usize = core::mem::size_of::<EventRecord>();

/// Event record published by probe handlers.
///
/// Fixed 36-byte layout, fully initialized before publish. `command` and
/// `message` are raw byte fields, truncated at capacity and not necessarily
/// NUL-terminated when they fill it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    /// Process identity (TGID) of the triggering task.
    pub pid: i32,
    /// Effective user identity of the triggering task.
    pub uid: i32,
    /// Short command name of the triggering task.
    pub command: [u8; COMM_CAPACITY],
    /// Display message selected by the handler.
    pub message: [u8; MESSAGE_CAPACITY],
}

// i32 + i32 + [u8; 16] + [u8; 12]: align 4, no padding.
const _: () = assert!(core::mem::size_of::<EventRecord>() == 36);

impl EventRecord {
    /// Create a fully zeroed record.
    ///
    /// Producers must start from a zeroed record so no stale stack or heap
    /// content crosses the transport boundary.
    pub fn zeroed() -> Self {
        Self {
            pid: 0,
            uid: 0,
            command: [0; COMM_CAPACITY],
            message: [0; MESSAGE_CAPACITY],
        }
    }

    /// Copy `src` into the command field, bounded at [`COMM_CAPACITY`].
    pub fn set_command(&mut self, src: &[u8]) {
        self.command = [0; COMM_CAPACITY];
        copy_bounded(&mut self.command, src);
    }

    /// Copy `src` into the message field.
    ///
    /// The copy bound is the smaller of [`MESSAGE_CAPACITY`] and the source
    /// length, so an oversized source truncates deterministically.
    pub fn set_message(&mut self, src: &[u8]) {
        self.message = [0; MESSAGE_CAPACITY];
        copy_bounded(&mut self.message, src);
    }

    /// Encode this record as a fixed-size byte block.
    pub fn encode(&self) -> [u8; EVENT_RECORD_SIZE] {
        let mut block = [0u8; EVENT_RECORD_SIZE];
        block.copy_from_slice(self.as_bytes());
        block
    }

    /// View this record as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(
                self as *const Self as *const u8,
                core::mem::size_of::<Self>(),
            )
        }
    }

    /// Decode one record from a raw byte slice.
    ///
    /// Returns `None` only when the input is shorter than the declared
    /// record size. Field content is best-effort bytes; malformed text is
    /// not a fault.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < core::mem::size_of::<Self>() {
            return None;
        }
        Some(unsafe { core::ptr::read_unaligned(data.as_ptr() as *const Self) })
    }

    /// Command field as text, stopped at the first NUL.
    pub fn command_text(&self) -> &str {
        text_until_nul(&self.command)
    }

    /// Message field as text, stopped at the first NUL.
    pub fn message_text(&self) -> &str {
        text_until_nul(&self.message)
    }
}

impl core::fmt::Display for EventRecord {
    /// Render as the display-sink line format: `pid uid command message`.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.pid,
            self.uid,
            self.command_text(),
            self.message_text()
        )
    }
}

/// Bounded copy primitive for fixed-capacity fields.
///
/// Copies `min(dst.len(), src.len())` bytes and returns the count. This is
/// the only copy path for string-like fields; there is no unbounded variant.
pub fn copy_bounded(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

/// Interpret a fixed-capacity field as text up to an embedded NUL.
///
/// Never reads past the field capacity; without a terminator the full
/// capacity is treated as data. Invalid UTF-8 decodes as best-effort up to
/// the first invalid byte.
pub fn text_until_nul(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    match core::str::from_utf8(&field[..end]) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&field[..e.valid_up_to()]).unwrap_or(""),
    }
}
