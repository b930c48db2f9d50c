//! Check queue.
//!
//! A deduplicated FIFO of channels awaiting a check. Strict FIFO
//! draining by a single worker is the backpressure mechanism
//! protecting the upstream provider; there is no per-channel
//! parallelism and no priority lane. All operations share one critical
//! section since callers include the scheduler loop, API handlers and
//! push notifications running concurrently.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::model::QueueEntry;

#[derive(Default)]
struct Inner {
    entries: VecDeque<QueueEntry>,
    /// channel id -> force flag, for O(1) dedup.
    index: HashMap<i64, bool>,
}

/// Thread-safe channel check queue.
pub struct CheckQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for CheckQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a channel at the tail. If the channel is already
    /// queued, its entry stays in place and the force flags are OR'd
    /// together. Returns true when a new entry was inserted.
    pub fn enqueue(&self, channel_id: i64, force: bool) -> bool {
        let inserted = {
            let mut inner = self.inner.lock().unwrap();
            match inner.index.get_mut(&channel_id) {
                Some(existing_force) => {
                    let merged = *existing_force || force;
                    *existing_force = merged;
                    if let Some(entry) = inner
                        .entries
                        .iter_mut()
                        .find(|e| e.channel_id == channel_id)
                    {
                        entry.force = merged;
                    }
                    false
                }
                None => {
                    inner.index.insert(channel_id, force);
                    inner.entries.push_back(QueueEntry {
                        channel_id,
                        enqueued_at: Utc::now(),
                        force,
                    });
                    true
                }
            }
        };
        if inserted {
            tracing::debug!("Enqueued channel {} (force: {})", channel_id, force);
            self.notify.notify_one();
        }
        inserted
    }

    /// Enqueue several channels; returns how many were newly inserted.
    pub fn enqueue_many(&self, channel_ids: &[i64], force: bool) -> usize {
        let added = channel_ids
            .iter()
            .filter(|id| self.enqueue(**id, force))
            .count();
        if added > 0 {
            tracing::info!(
                "Enqueued {}/{} channels for checking (force: {})",
                added,
                channel_ids.len(),
                force
            );
        }
        added
    }

    /// Remove and return the head entry. The entry's force flag is
    /// consumed by the caller and never re-enters the queue.
    pub fn dequeue(&self) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.entries.pop_front()?;
        inner.index.remove(&entry.channel_id);
        Some(entry)
    }

    /// Dequeue the head entry and mark it as the in-progress channel
    /// inside the queue's critical section. Anyone observing an empty
    /// queue afterwards is guaranteed to also see `current` set, so
    /// "queue empty AND worker idle" can never flicker true between a
    /// dequeue and the start of processing. `current` is untouched
    /// when the queue is empty.
    pub fn dequeue_into(&self, current: &Mutex<Option<i64>>) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.entries.pop_front()?;
        inner.index.remove(&entry.channel_id);
        *current.lock().unwrap() = Some(entry.channel_id);
        Some(entry)
    }

    /// Drop all pending entries. Does not affect a channel currently
    /// being processed by the worker.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.index.clear();
        if dropped > 0 {
            tracing::info!("Cleared {} pending queue entries", dropped);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, channel_id: i64) -> bool {
        self.inner.lock().unwrap().index.contains_key(&channel_id)
    }

    /// Wait until an enqueue happens. A notification from an enqueue
    /// with no waiter is retained, so the worker cannot miss a wakeup
    /// between draining and parking.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = CheckQueue::new();
        queue.enqueue(1, false);
        queue.enqueue(2, false);
        queue.enqueue(3, true);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue().unwrap().channel_id, 1);
        assert_eq!(queue.dequeue().unwrap().channel_id, 2);
        let last = queue.dequeue().unwrap();
        assert_eq!(last.channel_id, 3);
        assert!(last.force);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_dedup_ors_force() {
        let queue = CheckQueue::new();
        assert!(queue.enqueue(5, false));
        assert!(!queue.enqueue(5, true));

        assert_eq!(queue.len(), 1);
        let entry = queue.dequeue().unwrap();
        assert_eq!(entry.channel_id, 5);
        assert!(entry.force);
    }

    #[test]
    fn test_dedup_keeps_position() {
        let queue = CheckQueue::new();
        queue.enqueue(1, false);
        queue.enqueue(2, false);
        queue.enqueue(1, true);

        assert_eq!(queue.dequeue().unwrap().channel_id, 1);
        assert_eq!(queue.dequeue().unwrap().channel_id, 2);
    }

    #[test]
    fn test_force_never_downgraded() {
        let queue = CheckQueue::new();
        queue.enqueue(9, true);
        queue.enqueue(9, false);
        assert!(queue.dequeue().unwrap().force);
    }

    #[test]
    fn test_dequeue_consumes_force() {
        let queue = CheckQueue::new();
        queue.enqueue(7, true);
        assert!(queue.dequeue().unwrap().force);

        // Re-enqueueing without force yields a non-forced entry.
        queue.enqueue(7, false);
        assert!(!queue.dequeue().unwrap().force);
    }

    #[test]
    fn test_clear_and_contains() {
        let queue = CheckQueue::new();
        queue.enqueue_many(&[1, 2, 3], false);
        assert!(queue.contains(2));
        queue.clear();
        assert!(queue.is_empty());
        assert!(!queue.contains(2));
    }

    #[test]
    fn test_dequeue_into_marks_current_atomically() {
        let queue = CheckQueue::new();
        let current = Mutex::new(None);
        queue.enqueue(4, false);

        let entry = queue.dequeue_into(&current).unwrap();
        assert_eq!(entry.channel_id, 4);
        // An observer seeing the queue empty must also see the channel
        // in progress.
        assert!(queue.is_empty());
        assert_eq!(*current.lock().unwrap(), Some(4));

        // An empty dequeue leaves the in-progress marker alone.
        assert!(queue.dequeue_into(&current).is_none());
        assert_eq!(*current.lock().unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_wait_sees_prior_enqueue() {
        let queue = CheckQueue::new();
        queue.enqueue(1, false);
        // The stored permit makes this return immediately.
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.wait())
            .await
            .expect("wait should not block after an enqueue");
    }
}
