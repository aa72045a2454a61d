use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{error::SchedulerError, event::Event, SampleTime};

/// Queue slot: the event plus its insertion sequence for FIFO tie-breaks
struct Slot<T> {
    seq: u64,
    event: Event<T>,
}

impl<T> Slot<T> {
    fn key(&self) -> (SampleTime, u64) {
        (self.event.due_time, self.seq)
    }
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    // BinaryHeap is a max-heap; reverse so the earliest key sits on top
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Min-priority queue of pending events.
///
/// Ordered by due time, then by insertion order. Storage is reserved up front
/// and never grows: a full queue refuses new events instead of allocating.
pub struct EventQueue<T> {
    heap: BinaryHeap<Slot<T>>,
    capacity: usize,
    next_seq: u64,
}

impl<T> EventQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    /// Insert an event in O(log n)
    pub fn push(&mut self, event: Event<T>) -> Result<(), SchedulerError> {
        if self.is_full() {
            return Err(SchedulerError::QueueFull {
                capacity: self.capacity,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Slot { seq, event });
        Ok(())
    }

    /// Earliest pending event, if any
    pub fn peek_earliest(&self) -> Option<&Event<T>> {
        self.heap.peek().map(|slot| &slot.event)
    }

    /// Remove and return the earliest event; `None` when empty
    pub fn pop_earliest(&mut self) -> Option<Event<T>> {
        self.heap.pop().map(|slot| slot.event)
    }

    /// Pop the earliest event only if it is due at or before `window`
    pub fn pop_due(&mut self, window: SampleTime) -> Option<Event<T>> {
        let due = self.peek_earliest()?.due_time;
        if due <= window {
            self.pop_earliest()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
