//! Bounded per-signal pending queue
//!
//! One queue exists per signal number per process. Entries are kept in
//! priority order (stable for equal priorities, so same-signal instances
//! stay FIFO) in a fixed-capacity arena: a slot vector plus a free list
//! of indices. Enqueue and dequeue are index push/pop, no per-entry
//! allocation once a slot has been created.

use super::constants::*;
use super::types::SigInfo;
use crate::error::KernelError;
use crate::time;
use alloc::vec::Vec;

use super::delivery::DeliverFlags;

const NIL: u32 = u32::MAX;

struct Slot {
    entry: QueueEntry,
    next: u32,
    prev: u32,
}

/// A queued signal instance
#[derive(Debug, Clone, Copy)]
pub struct QueueEntry {
    /// Signal number
    pub signal: u32,
    /// Signal information payload
    pub info: SigInfo,
    /// Delivery priority, derived from the signal number
    pub priority: u8,
    /// Delivery flags the instance was generated with
    pub flags: DeliverFlags,
    /// Enqueue timestamp in kernel ticks
    pub timestamp: u64,
}

/// Priority-ordered bounded queue for one signal number
pub struct SignalQueue {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    count: u32,
    max_size: u32,
    is_realtime: bool,
}

impl SignalQueue {
    /// Create the queue for a signal; RT queues get the deep capacity
    pub fn new(sig: u32) -> Self {
        let is_realtime = is_realtime_signal(sig);
        SignalQueue {
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            count: 0,
            max_size: if is_realtime {
                RT_QUEUE_CAPACITY
            } else {
                STD_QUEUE_CAPACITY
            },
            is_realtime,
        }
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> u32 {
        self.max_size
    }

    pub fn is_realtime(&self) -> bool {
        self.is_realtime
    }

    /// Enqueue a signal instance in priority order
    ///
    /// Fails with `QueueFull` at capacity; the caller decides whether the
    /// drop is fatal (it never is for signal generation, only counted).
    pub fn enqueue(
        &mut self,
        signal: u32,
        info: SigInfo,
        flags: DeliverFlags,
    ) -> Result<(), KernelError> {
        if self.count >= self.max_size {
            return Err(KernelError::QueueFull);
        }
        let entry = QueueEntry {
            signal,
            info,
            priority: signal_priority(signal),
            flags,
            timestamp: time::get_ticks(),
        };
        let idx = self.alloc_slot(entry);
        self.insert_ordered(idx);
        self.count += 1;
        Ok(())
    }

    /// Dequeue the highest-priority entry
    pub fn dequeue(&mut self) -> Option<QueueEntry> {
        if self.head == NIL {
            return None;
        }
        let idx = self.head;
        let entry = self.slots[idx as usize].entry;
        let next = self.slots[idx as usize].next;
        self.head = next;
        if next != NIL {
            self.slots[next as usize].prev = NIL;
        } else {
            self.tail = NIL;
        }
        self.free_slot(idx);
        self.count -= 1;
        Some(entry)
    }

    /// Look at the next entry without removing it
    pub fn peek(&self) -> Option<&QueueEntry> {
        if self.head == NIL {
            None
        } else {
            Some(&self.slots[self.head as usize].entry)
        }
    }

    /// Drop every entry, returning how many were removed
    pub fn clear(&mut self) -> u32 {
        let mut cleared = 0;
        while self.dequeue().is_some() {
            cleared += 1;
        }
        cleared
    }

    #[cfg(test)]
    pub(crate) fn set_capacity_for_test(&mut self, cap: u32) {
        self.max_size = cap;
    }

    fn alloc_slot(&mut self, entry: QueueEntry) -> u32 {
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.entry = entry;
            slot.next = NIL;
            slot.prev = NIL;
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                entry,
                next: NIL,
                prev: NIL,
            });
            idx
        }
    }

    fn free_slot(&mut self, idx: u32) {
        self.free.push(idx);
    }

    /// Insert a slot keeping priority order; equal priorities keep
    /// arrival order (new entry goes after existing equals)
    fn insert_ordered(&mut self, idx: u32) {
        let priority = self.slots[idx as usize].entry.priority;

        if self.head == NIL {
            self.head = idx;
            self.tail = idx;
            return;
        }

        if priority < self.slots[self.head as usize].entry.priority {
            self.slots[idx as usize].next = self.head;
            self.slots[self.head as usize].prev = idx;
            self.head = idx;
            return;
        }

        let mut current = self.head;
        loop {
            let next = self.slots[current as usize].next;
            if next == NIL || self.slots[next as usize].entry.priority > priority {
                break;
            }
            current = next;
        }

        let next = self.slots[current as usize].next;
        self.slots[idx as usize].prev = current;
        self.slots[idx as usize].next = next;
        self.slots[current as usize].next = idx;
        if next != NIL {
            self.slots[next as usize].prev = idx;
        } else {
            self.tail = idx;
        }
    }
}
