//! Lock-free shared event ring.
//!
//! One bounded ring shared by all producers, drained by a single consumer.
//! Producers reserve a slot through an atomic sequence protocol (bounded
//! CAS retry, no lock, probe-path safe) and commit the encoded record; a
//! full ring drops the record silently, with no drop counter on this
//! strategy. Submission order equals delivery order.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

use crate::channel::{
    Channel, ChannelKind, ChannelState, Delivery, Error, EventCallback, StateCell,
};
use crate::record::{EVENT_RECORD_SIZE, EventRecord};

/// One ring slot: a sequence word gating a fixed record block.
struct Slot {
    seq: AtomicUsize,
    data: UnsafeCell<[u8; EVENT_RECORD_SIZE]>,
}

/// Bounded multi-producer, single-consumer ring of encoded records.
///
/// Slot sequence protocol: slot `i` starts with `seq == i`. A producer that
/// wins the head CAS for position `p` owns slot `p & mask`, writes the
/// block, then publishes with `seq = p + 1`. The consumer at position `p`
/// waits for `seq == p + 1`, reads, and recycles with `seq = p + capacity`.
pub(crate) struct RingBuf {
    slots: Box<[Slot]>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Slots are only written by the producer that won the reservation and only
// read by the single consumer after the publish store.
unsafe impl Sync for RingBuf {}
unsafe impl Send for RingBuf {}

impl RingBuf {
    fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(Error::InvalidCapacity(capacity));
        }

        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Slot {
                seq: AtomicUsize::new(i),
                data: UnsafeCell::new([0u8; EVENT_RECORD_SIZE]),
            });
        }
        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        })
    }

    /// Reserve-or-drop submit. Returns `false` when the ring is full.
    fn push(&self, block: &[u8; EVENT_RECORD_SIZE]) -> bool {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { *slot.data.get() = *block };
                        slot.seq.store(pos + 1, Ordering::Release);
                        return true;
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // The slot one lap behind is still unconsumed: ring full.
                return false;
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Single-consumer pop in submission order.
    fn pop(&self, out: &mut [u8; EVENT_RECORD_SIZE]) -> bool {
        let pos = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[pos & self.mask];
        let seq = slot.seq.load(Ordering::Acquire);

        if seq != pos + 1 {
            return false;
        }

        *out = unsafe { *slot.data.get() };
        slot.seq.store(pos + self.mask + 1, Ordering::Release);
        self.tail.store(pos + 1, Ordering::Relaxed);
        true
    }
}

/// Channel adapter over the shared ring.
pub struct RingBufChannel {
    ring: RingBuf,
    state: StateCell,
    callback: Mutex<EventCallback>,
}

impl RingBufChannel {
    pub(crate) fn new(capacity: usize, callback: EventCallback) -> Result<Self, Error> {
        Ok(Self {
            ring: RingBuf::new(capacity)?,
            state: StateCell::open(),
            callback: Mutex::new(callback),
        })
    }
}

impl Channel for RingBufChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::RingBuf
    }

    fn state(&self) -> ChannelState {
        self.state.get()
    }

    fn publish(&self, record: &EventRecord) -> bool {
        if !self.state.accepts_publish() {
            return false;
        }
        self.ring.push(&record.encode())
    }

    fn poll(&self) -> usize {
        if !self.state.enter_polling() {
            return 0;
        }

        let mut delivered = 0;
        let mut block = [0u8; EVENT_RECORD_SIZE];
        let mut callback = self.callback.lock();
        while self.ring.pop(&mut block) {
            if let Some(record) = EventRecord::decode(&block) {
                callback(0, Delivery::Record(&record));
                delivered += 1;
            }
        }
        delivered
    }

    fn close(&self) {
        self.state.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(tag: u8) -> [u8; EVENT_RECORD_SIZE] {
        let mut rec = EventRecord::zeroed();
        rec.pid = tag as i32;
        rec.encode()
    }

    #[test]
    fn push_pop_preserves_submission_order() {
        let ring = RingBuf::new(8).unwrap();
        for i in 0..5 {
            assert!(ring.push(&block(i)));
        }

        let mut out = [0u8; EVENT_RECORD_SIZE];
        for i in 0..5 {
            assert!(ring.pop(&mut out));
            assert_eq!(EventRecord::decode(&out).unwrap().pid, i as i32);
        }
        assert!(!ring.pop(&mut out));
    }

    #[test]
    fn full_ring_drops_new_entries() {
        let ring = RingBuf::new(4).unwrap();
        for i in 0..4 {
            assert!(ring.push(&block(i)));
        }
        assert!(!ring.push(&block(99)));

        // Draining one slot makes room again.
        let mut out = [0u8; EVENT_RECORD_SIZE];
        assert!(ring.pop(&mut out));
        assert!(ring.push(&block(4)));
    }

    #[test]
    fn capacity_must_be_power_of_two() {
        assert!(matches!(RingBuf::new(0), Err(Error::InvalidCapacity(0))));
        assert!(matches!(RingBuf::new(12), Err(Error::InvalidCapacity(12))));
    }
}
