//! Probe controller: hook attachment and event firing.
//!
//! The control-side registry binding loaded handlers to kernel hook points.
//! Hook names are symbolic, `category:event` pairs resolved against the
//! known-hook table at attach time; a name that does not resolve is a fatal
//! setup error surfaced to the caller, never swallowed. Attachment returns a
//! handle whose drop detaches, so hooks release with scope.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use spin::Mutex;

use crate::context::ProbeContext;
use crate::program::{self, HandlerRef};

/// Hook points the event source knows how to resolve.
///
/// Stands in for kernel symbol resolution; anything else fails attach.
pub const KNOWN_HOOKS: &[&str] = &[
    "kprobe:sys_execve",
    "kprobe:sys_sync",
    "kprobe:do_nanosleep",
    "raw_tp:sys_enter",
    "tracepoint:syscalls:sys_enter_execve",
    "tracepoint:syscalls:sys_enter_openat",
];

/// Error types for probe attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Hook name is not `category:event` shaped.
    InvalidName(String),
    /// Hook name did not resolve.
    HookNotFound(String),
    /// The hook already has a handler attached.
    AlreadyAttached(String),
    /// Detach of a hook with no attachment.
    NotAttached(String),
    /// Handler reference does not resolve to a loaded program.
    HandlerNotFound,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "Malformed hook name: '{}'", name),
            Self::HookNotFound(name) => write!(f, "Hook not found: '{}'", name),
            Self::AlreadyAttached(name) => write!(f, "Hook already attached: '{}'", name),
            Self::NotAttached(name) => write!(f, "Hook not attached: '{}'", name),
            Self::HandlerNotFound => write!(f, "Handler reference is not loaded"),
        }
    }
}

impl core::error::Error for Error {}

/// Global hook attachment registry.
static ATTACHMENTS: Mutex<BTreeMap<String, HandlerRef>> = Mutex::new(BTreeMap::new());

/// Attach a handler to a hook point.
///
/// The returned handle detaches on drop; call [`AttachHandle::detach`] for
/// an explicit release. One handler per hook.
pub fn attach(hook: &str, handler: HandlerRef) -> Result<AttachHandle, Error> {
    if !hook.contains(':') {
        return Err(Error::InvalidName(hook.to_string()));
    }
    if !KNOWN_HOOKS.contains(&hook) {
        return Err(Error::HookNotFound(hook.to_string()));
    }
    if !program::handler_exists(handler) {
        return Err(Error::HandlerNotFound);
    }

    let mut attachments = ATTACHMENTS.lock();
    if attachments.contains_key(hook) {
        return Err(Error::AlreadyAttached(hook.to_string()));
    }
    attachments.insert(hook.to_string(), handler);
    log::info!("Attached handler to {}", hook);

    Ok(AttachHandle {
        hook: Some(hook.to_string()),
    })
}

/// Whether a hook currently has a handler.
pub fn is_attached(hook: &str) -> bool {
    ATTACHMENTS.lock().contains_key(hook)
}

/// Get the number of live attachments.
pub fn attachment_count() -> usize {
    ATTACHMENTS.lock().len()
}

/// Fire one event at a hook point.
///
/// Runs the attached handler with the given context and returns its value;
/// `None` when the hook has no attachment. This is the event-source
/// boundary: everything past here is probe-path code.
pub fn fire(hook: &str, ctx: &ProbeContext) -> Option<u32> {
    let handler = {
        let attachments = ATTACHMENTS.lock();
        attachments.get(hook).copied()
    };
    handler.and_then(|h| program::run_handler(h, ctx))
}

fn detach_hook(hook: &str) -> Result<(), Error> {
    let mut attachments = ATTACHMENTS.lock();
    match attachments.remove(hook) {
        Some(_) => {
            log::info!("Detached handler from {}", hook);
            Ok(())
        }
        None => Err(Error::NotAttached(hook.to_string())),
    }
}

/// Live attachment handle. Dropping it detaches the hook.
pub struct AttachHandle {
    hook: Option<String>,
}

impl AttachHandle {
    /// The hook this handle holds.
    pub fn hook(&self) -> &str {
        self.hook.as_deref().unwrap_or("")
    }

    /// Explicitly detach, consuming the handle.
    pub fn detach(mut self) -> Result<(), Error> {
        match self.hook.take() {
            Some(hook) => detach_hook(&hook),
            None => Ok(()),
        }
    }
}

impl Drop for AttachHandle {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            let _ = detach_hook(&hook);
        }
    }
}
