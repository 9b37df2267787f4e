//! Tick-keyed timer queue for deferred one-shot work ("wait N ticks, then ...").
//!
//! Tasks due on the same tick fire in the order they were scheduled, so replays of
//! the same event stream always produce the same action order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Game ticks per second of wall time.
pub const TICKS_PER_SECOND: u64 = 20;
pub const MILLIS_PER_TICK: u64 = 1000 / TICKS_PER_SECOND;

/// Converts a wall-clock delay to ticks, rounding up.
pub const fn millis_to_ticks(millis: u64) -> u64 {
    millis.div_ceil(MILLIS_PER_TICK)
}

#[derive(Debug)]
struct Entry<T> {
    due: u64,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Debug)]
pub struct TickScheduler<T> {
    queue: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
}

impl<T> Default for TickScheduler<T> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TickScheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` to fire once `delay` ticks after `now`. A zero delay fires
    /// on the next drain.
    pub fn schedule(&mut self, now: u64, delay: u64, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry {
            due: now + delay,
            seq,
            task,
        }));
    }

    /// Removes and returns every task due at or before `now`, oldest first.
    pub fn drain_due(&mut self, now: u64) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.queue.peek() {
            if entry.due > now {
                break;
            }
            if let Some(Reverse(entry)) = self.queue.pop() {
                due.push(entry.task);
            }
        }
        due
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        let entries = std::mem::take(&mut self.queue);
        self.queue = entries
            .into_iter()
            .filter(|Reverse(entry)| keep(&entry.task))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(entry)| entry.due)
    }
}
