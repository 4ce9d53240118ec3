//! Control-side event collection loop.
//!
//! The consumer half of a session: a single thread repeatedly polls one
//! channel until cancelled, then closes it. Cancellation is cooperative
//! through a shared token so the loop can be stopped from another thread or
//! a signal handler without tearing anything down mid-poll.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::channel::{Channel, Delivery, EventCallback};

/// Shared cancellation flag for a poll loop.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request loop shutdown. Safe from any thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `channel` until the token cancels, then close it.
///
/// The close runs on every exit path; a cancelled loop never leaks an open
/// channel. Returns the total number of items delivered.
pub fn run_poll_loop(channel: &dyn Channel, token: &CancelToken) -> usize {
    let mut delivered = 0;
    while !token.is_cancelled() {
        let n = channel.poll();
        delivered += n;
        if n == 0 {
            core::hint::spin_loop();
        }
    }
    channel.close();
    log::info!("Collector stopped after {} events", delivered);
    delivered
}

/// Standard display callback: log each delivery at info level.
///
/// Records render as "pid uid command message"; trace lines pass through.
pub fn display_callback() -> EventCallback {
    Box::new(|_cpu, delivery| match delivery {
        Delivery::Record(record) => log::info!("{}", record),
        Delivery::Line(line) => log::info!("{}", line),
    })
}

/// Lost-event reporter for the per-CPU buffer strategy.
pub fn report_lost_callback() -> crate::channel::LostCallback {
    Box::new(|cpu, lost| {
        log::warn!("lost {} events on CPU {}", lost, cpu);
    })
}
