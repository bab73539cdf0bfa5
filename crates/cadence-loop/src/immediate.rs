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

//! The multi-producer, single-consumer queue feeding an event loop.
//!
//! Any number of [`ImmediateSender`]s may offer items from any thread; the
//! single [`ImmediateQueue`] consumer receives them in arrival order and can
//! wait for the next one with an optional timeout.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Result of a bounded wait on an [`ImmediateQueue`].
#[derive(Debug, PartialEq, Eq)]
pub enum Taken<T> {
    /// An item arrived.
    Item(T),
    /// The wait elapsed without an item.
    TimedOut,
    /// Every sender is gone and the queue is empty; nothing can ever arrive.
    Disconnected,
}

/// Producer end of an immediate queue. Cheap to clone, safe to share.
#[derive(Debug)]
pub struct ImmediateSender<T> {
    sender: Sender<T>,
}

impl<T> Clone for ImmediateSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> ImmediateSender<T> {
    /// Enqueues `item` without blocking.
    ///
    /// ## Returns
    /// The item back if the consumer has been dropped.
    pub fn offer(&self, item: T) -> Result<(), T> {
        self.sender.send(item).map_err(|e| {
            log::trace!("Immediate queue consumer is gone, rejecting item.");
            e.into_inner()
        })
    }
}

/// Consumer end of an immediate queue.
#[derive(Debug)]
pub struct ImmediateQueue<T> {
    receiver: Receiver<T>,
}

impl<T> ImmediateQueue<T> {
    /// Creates an unbounded queue.
    ///
    /// ## Returns
    /// The producer handle and the consumer.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (ImmediateSender<T>, ImmediateQueue<T>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ImmediateSender { sender }, ImmediateQueue { receiver })
    }

    /// Waits for the next item.
    ///
    /// ## Arguments
    /// * `timeout` - How long to wait; `None` waits until an item arrives or
    ///   every sender is dropped.
    pub fn take_with_timeout(&self, timeout: Option<Duration>) -> Taken<T> {
        match timeout {
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(item) => Taken::Item(item),
                Err(RecvTimeoutError::Timeout) => Taken::TimedOut,
                Err(RecvTimeoutError::Disconnected) => Taken::Disconnected,
            },
            None => match self.receiver.recv() {
                Ok(item) => Taken::Item(item),
                Err(_) => Taken::Disconnected,
            },
        }
    }

    /// Removes every queued item without blocking.
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.receiver.try_iter()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn single_producer_keeps_order() {
        let (tx, queue) = ImmediateQueue::new();
        for i in 0..5 {
            tx.offer(i).expect("offer should succeed");
        }

        let received: Vec<_> = (0..5)
            .map(|_| match queue.take_with_timeout(Some(Duration::from_millis(50))) {
                Taken::Item(i) => i,
                other => panic!("expected an item, got {other:?}"),
            })
            .collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_times_out() {
        let (_tx, queue) = ImmediateQueue::<u32>::new();
        let start = Instant::now();
        assert_eq!(
            queue.take_with_timeout(Some(Duration::from_millis(30))),
            Taken::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn zero_timeout_does_not_block() {
        let (tx, queue) = ImmediateQueue::new();
        assert_eq!(queue.take_with_timeout(Some(Duration::ZERO)), Taken::TimedOut);
        tx.offer("ready").unwrap();
        assert_eq!(queue.take_with_timeout(Some(Duration::ZERO)), Taken::Item("ready"));
    }

    #[test]
    fn unbounded_wait_wakes_on_offer() {
        let (tx, queue) = ImmediateQueue::new();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.offer(42).expect("Send from thread failed");
        });

        assert_eq!(queue.take_with_timeout(None), Taken::Item(42));
        producer.join().expect("Thread join failed");
    }

    #[test]
    fn dropped_senders_disconnect() {
        let (tx, queue) = ImmediateQueue::<u8>::new();
        drop(tx);
        assert_eq!(queue.take_with_timeout(None), Taken::Disconnected);
        assert_eq!(
            queue.take_with_timeout(Some(Duration::from_millis(5))),
            Taken::Disconnected
        );
    }

    #[test]
    fn offer_fails_after_consumer_drop() {
        let (tx, queue) = ImmediateQueue::new();
        drop(queue);
        assert_eq!(tx.offer(7), Err(7));
    }

    #[test]
    fn drain_empties_queue() {
        let (tx, queue) = ImmediateQueue::new();
        tx.offer('a').unwrap();
        tx.offer('b').unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain().collect::<String>(), "ab");
        assert!(queue.is_empty());
    }

    #[test]
    fn many_producers_preserve_per_producer_order() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 500;

        let (tx, queue) = ImmediateQueue::new();
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        tx.offer((p, seq)).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);
        for handle in handles {
            handle.join().unwrap();
        }

        let mut last_seen: HashMap<usize, usize> = HashMap::new();
        let mut total = 0;
        while let Taken::Item((p, seq)) = queue.take_with_timeout(Some(Duration::from_millis(50))) {
            if let Some(prev) = last_seen.insert(p, seq) {
                assert!(seq > prev, "producer {p} reordered: {prev} then {seq}");
            }
            total += 1;
        }
        assert_eq!(total, PRODUCERS * PER_PRODUCER);
    }
}
