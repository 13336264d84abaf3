use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Shared state of one download: the work queue of chunk indices, the
/// write-once result buffer, per-index failure counts and the first index
/// to exhaust its budget.
///
/// Workers pull indices with [`try_next`](ChunkScheduler::try_next) and
/// report back with [`complete`](ChunkScheduler::complete) or
/// [`requeue`](ChunkScheduler::requeue). Locks are only held for queue and
/// slot bookkeeping, never across I/O.
pub(super) struct ChunkScheduler {
    total: u32,
    retry_budget: u32,
    pending: Mutex<VecDeque<u32>>,
    /// Failed-attempt count per index.
    failures: Mutex<Vec<u32>>,
    /// Result buffer; each slot is written at most once.
    slots: Mutex<Vec<Option<Bytes>>>,
    completed: AtomicU32,
    failed: Mutex<Option<FailedChunk>>,
    notify: Notify,
}

/// The chunk that spent its retry budget and sank the download.
#[derive(Debug, Clone, Copy)]
pub(super) struct FailedChunk {
    pub index: u32,
    pub attempts: u32,
}

/// Outcome of reporting a failed attempt.
pub(super) enum Requeue {
    /// The index went back on the queue for another seeder.
    Retry { failures: u32 },
    /// The index may fail no more; the download aborts.
    Exhausted { failures: u32 },
}

impl ChunkScheduler {
    pub fn new(total: u32, retry_budget: u32) -> Self {
        Self {
            total,
            retry_budget,
            pending: Mutex::new((0..total).collect()),
            failures: Mutex::new(vec![0; total as usize]),
            slots: Mutex::new(vec![None; total as usize]),
            completed: AtomicU32::new(0),
            failed: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Pops the next chunk index to fetch, if any is queued.
    pub fn try_next(&self) -> Option<u32> {
        self.pending.lock().pop_front()
    }

    /// Stores a verified chunk into its slot. Later writes to the same
    /// slot are ignored, so the completed count never double-counts.
    pub fn complete(&self, index: u32, data: Bytes) {
        {
            let mut slots = self.slots.lock();
            let slot = &mut slots[index as usize];
            if slot.is_some() {
                return;
            }
            *slot = Some(data);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Records a failed attempt for an index. A chunk may fail at most
    /// `retry_budget` times; the failure that spends the budget marks the
    /// whole download as failed instead of re-queueing.
    pub fn requeue(&self, index: u32) -> Requeue {
        let failures = {
            let mut counts = self.failures.lock();
            counts[index as usize] += 1;
            counts[index as usize]
        };
        if failures >= self.retry_budget {
            let mut failed = self.failed.lock();
            if failed.is_none() {
                *failed = Some(FailedChunk {
                    index,
                    attempts: failures,
                });
            }
            self.notify.notify_waiters();
            Requeue::Exhausted { failures }
        } else {
            self.pending.lock().push_back(index);
            self.notify.notify_waiters();
            Requeue::Retry { failures }
        }
    }

    /// The first chunk to exhaust its budget, if any.
    pub fn failed(&self) -> Option<FailedChunk> {
        *self.failed.lock()
    }

    pub fn completed_count(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count() == self.total
    }

    /// Parks a worker until another worker completes, re-queues or fails
    /// a chunk.
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }

    /// Takes the result buffer once every slot is filled. `None` if any
    /// slot is still empty.
    pub fn take_chunks(&self) -> Option<Vec<Bytes>> {
        let mut slots = self.slots.lock();
        if slots.iter().any(|slot| slot.is_none()) {
            return None;
        }
        Some(std::mem::take(&mut *slots).into_iter().flatten().collect())
    }
}
