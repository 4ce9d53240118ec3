//! Per-CPU buffered event stream.
//!
//! Each CPU has its own bounded staging queue. Producers encode the record
//! and enqueue on the calling CPU's queue; a full queue drops the record and
//! counts it against that CPU. The consumer drains queues in CPU scan order,
//! so delivery is ordered per CPU and interleaved across CPUs; global
//! ordering is not a property of this strategy and must not be assumed.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::channel::{
    Channel, ChannelKind, ChannelState, Delivery, EventCallback, LostCallback, StateCell,
};
use crate::platform;
use crate::record::{EVENT_RECORD_SIZE, EventRecord};

/// One CPU's staging queue plus its lost-event counter.
struct CpuQueue {
    queue: Mutex<VecDeque<[u8; EVENT_RECORD_SIZE]>>,
    lost: AtomicU64,
}

impl CpuQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            lost: AtomicU64::new(0),
        }
    }
}

/// Per-CPU buffered channel (perf-buffer style).
pub struct PerCpuBufferChannel {
    cpus: Vec<CpuQueue>,
    capacity: usize,
    state: StateCell,
    callback: Mutex<EventCallback>,
    lost_callback: Mutex<Option<LostCallback>>,
}

impl PerCpuBufferChannel {
    /// The CPU count is captured at creation time.
    pub(crate) fn new(
        capacity: usize,
        callback: EventCallback,
        lost_callback: Option<LostCallback>,
    ) -> Self {
        let count = platform::cpu_count() as usize;
        let mut cpus = Vec::with_capacity(count);
        for _ in 0..count {
            cpus.push(CpuQueue::new());
        }
        Self {
            cpus,
            capacity: capacity.max(1),
            state: StateCell::open(),
            callback: Mutex::new(callback),
            lost_callback: Mutex::new(lost_callback),
        }
    }

    /// Lost-event count for one CPU since the last poll that reported it.
    pub fn pending_lost(&self, cpu: u32) -> u64 {
        self.cpus
            .get(cpu as usize)
            .map(|q| q.lost.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Channel for PerCpuBufferChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::PerCpuBuffer
    }

    fn state(&self) -> ChannelState {
        self.state.get()
    }

    fn publish(&self, record: &EventRecord) -> bool {
        if !self.state.accepts_publish() {
            return false;
        }

        let cpu = platform::cpu_id() as usize;
        let Some(slot) = self.cpus.get(cpu) else {
            log::warn!("publish from CPU {} outside captured CPU count", cpu);
            return false;
        };

        let mut queue = slot.queue.lock();
        if queue.len() >= self.capacity {
            // Backpressure: the consumer is polling too slowly. Drop and count.
            slot.lost.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        queue.push_back(record.encode());
        true
    }

    fn poll(&self) -> usize {
        if !self.state.enter_polling() {
            return 0;
        }

        let mut delivered = 0;
        for (cpu, slot) in self.cpus.iter().enumerate() {
            // Take the batch out first so the callback never runs under the
            // queue lock producers contend on.
            let batch: Vec<_> = {
                let mut queue = slot.queue.lock();
                queue.drain(..).collect()
            };

            let mut callback = self.callback.lock();
            for block in &batch {
                if let Some(record) = EventRecord::decode(block) {
                    callback(cpu as u32, Delivery::Record(&record));
                    delivered += 1;
                }
            }
            drop(callback);

            let lost = slot.lost.swap(0, Ordering::Relaxed);
            if lost > 0 {
                match self.lost_callback.lock().as_mut() {
                    Some(lost_cb) => lost_cb(cpu as u32, lost),
                    None => log::warn!("lost {} events on CPU {}", lost, cpu),
                }
            }
        }
        delivered
    }

    fn close(&self) {
        self.state.close();
        for slot in &self.cpus {
            slot.queue.lock().clear();
        }
    }
}
