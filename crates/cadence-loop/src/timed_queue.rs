// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deadline-ordered storage for deferred jobs.
//!
//! Entries live in a slot arena; a binary min-heap orders them by
//! `(due time, insertion sequence)`. A [`ScheduledHandle`] names an entry by
//! slot index plus sequence number. Sequence numbers are never reused, so a
//! stale handle can never reach an entry that later occupies the same slot.
//!
//! The queue performs no locking. It is owned by one event loop worker and
//! only ever touched from that thread.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use cadence_core::Job;

/// Opaque cancellation token for a scheduled job.
///
/// A handle is a lookup key, not an owner: holding one keeps nothing alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduledHandle {
    owner: u64,
    slot: u32,
    sequence: u64,
}

impl ScheduledHandle {
    /// Identifier of the queue (and event loop) that issued this handle.
    pub fn owner(&self) -> u64 {
        self.owner
    }

    /// Insertion sequence of the entry this handle refers to.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[derive(Debug)]
struct ScheduledEntry {
    sequence: u64,
    /// `None` once the entry has been cancelled.
    job: Option<Job>,
}

impl ScheduledEntry {
    fn is_active(&self) -> bool {
        self.job.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DueKey {
    due_ms: u64,
    sequence: u64,
    slot: u32,
}

/// Priority queue of jobs keyed by absolute due time.
#[derive(Debug, Default)]
pub struct TimedJobQueue {
    owner: u64,
    slots: Vec<Option<ScheduledEntry>>,
    free: Vec<u32>,
    heap: BinaryHeap<Reverse<DueKey>>,
    next_sequence: u64,
    active: usize,
}

impl TimedJobQueue {
    /// Creates an empty queue whose handles carry the `owner` identifier.
    pub fn new(owner: u64) -> Self {
        Self {
            owner,
            ..Default::default()
        }
    }

    /// Inserts `job` to become due at `due_ms`.
    ///
    /// Jobs with equal due times come out in insertion order.
    pub fn offer(&mut self, due_ms: u64, job: Job) -> ScheduledHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let entry = ScheduledEntry {
            sequence,
            job: Some(job),
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                (self.slots.len() - 1) as u32
            }
        };

        self.heap.push(Reverse(DueKey {
            due_ms,
            sequence,
            slot,
        }));
        self.active += 1;

        ScheduledHandle {
            owner: self.owner,
            slot,
            sequence,
        }
    }

    /// Removes and returns the earliest job if it is due at `now_ms`.
    ///
    /// Cancelled entries found at the front are discarded along the way.
    pub fn poll_due(&mut self, now_ms: u64) -> Option<Job> {
        let key = self.front()?;
        if key.due_ms > now_ms {
            return None;
        }

        self.heap.pop();
        let entry = self.release(key.slot)?;
        self.active -= 1;
        entry.job
    }

    /// Time until the earliest pending job is due, clamped to zero.
    ///
    /// ## Returns
    /// `None` when nothing is pending, meaning the caller may wait unbounded.
    pub fn time_until_next(&mut self, now_ms: u64) -> Option<Duration> {
        self.front()
            .map(|key| Duration::from_millis(key.due_ms.saturating_sub(now_ms)))
    }

    /// Cancels the entry behind `handle`.
    ///
    /// ## Returns
    /// `true` if this call deactivated a pending entry; `false` if the entry
    /// already ran, was already cancelled, or the handle is foreign.
    pub fn cancel(&mut self, handle: &ScheduledHandle) -> bool {
        if handle.owner != self.owner {
            return false;
        }
        let Some(Some(entry)) = self.slots.get_mut(handle.slot as usize) else {
            return false;
        };
        if entry.sequence != handle.sequence || !entry.is_active() {
            return false;
        }

        // The heap key stays behind and is discarded when it surfaces.
        entry.job = None;
        self.active -= 1;
        true
    }

    /// Number of pending (not cancelled) jobs.
    pub fn len(&self) -> usize {
        self.active
    }

    /// Returns `true` if no job is pending.
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Returns the earliest active key, dropping cancelled keys above it.
    fn front(&mut self) -> Option<DueKey> {
        while let Some(&Reverse(key)) = self.heap.peek() {
            let live = matches!(
                &self.slots[key.slot as usize],
                Some(entry) if entry.sequence == key.sequence && entry.is_active()
            );
            if live {
                return Some(key);
            }
            self.heap.pop();
            if matches!(&self.slots[key.slot as usize], Some(entry) if entry.sequence == key.sequence)
            {
                self.release(key.slot);
            }
        }
        None
    }

    fn release(&mut self, slot: u32) -> Option<ScheduledEntry> {
        let entry = self.slots[slot as usize].take();
        self.free.push(slot);
        entry
    }
}
