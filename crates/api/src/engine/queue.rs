//! FIFO intake queue of pending job ids.

use std::collections::VecDeque;

use reface_core::types::JobId;
use tokio::sync::{Mutex, MutexGuard};

/// Ordered queue of job ids waiting for a worker.
///
/// Holds ids only; the records live in the registry. Compound operations
/// that must see queue and registry consistently take [`IntakeQueue::lock`]
/// first and keep the guard while touching the registry.
#[derive(Default)]
pub struct IntakeQueue {
    ids: Mutex<VecDeque<JobId>>,
}

/// Exclusive access to the queue.
pub struct QueueGuard<'a> {
    ids: MutexGuard<'a, VecDeque<JobId>>,
}

impl IntakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> QueueGuard<'_> {
        QueueGuard {
            ids: self.ids.lock().await,
        }
    }

}

impl QueueGuard<'_> {
    /// Append `id`; returns its 1-based position.
    pub fn push(&mut self, id: JobId) -> usize {
        self.ids.push_back(id);
        self.ids.len()
    }

    pub fn peek(&self) -> Option<JobId> {
        self.ids.front().copied()
    }

    pub fn pop(&mut self) -> Option<JobId> {
        self.ids.pop_front()
    }

    /// 1-based rank of `id`, if queued.
    pub fn position(&self, id: JobId) -> Option<usize> {
        self.ids.iter().position(|queued| *queued == id).map(|i| i + 1)
    }

    /// Queued ids, head first.
    pub fn ids(&self) -> Vec<JobId> {
        self.ids.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_in_submission_order() {
        let queue = IntakeQueue::new();
        let (a, b, c) = (JobId::new_v4(), JobId::new_v4(), JobId::new_v4());
        {
            let mut q = queue.lock().await;
            assert_eq!(q.push(a), 1);
            assert_eq!(q.push(b), 2);
            assert_eq!(q.push(c), 3);
        }

        let mut q = queue.lock().await;
        assert_eq!(q.position(c), Some(3));
        assert_eq!(q.peek(), Some(a));
        assert_eq!(q.pop(), Some(a));
        assert_eq!(q.position(c), Some(2));
        assert_eq!(q.position(a), None);
        assert_eq!(q.ids(), [b, c]);
    }

    #[tokio::test]
    async fn empty_queue_pops_nothing() {
        let queue = IntakeQueue::new();
        let mut q = queue.lock().await;
        assert_eq!(q.peek(), None);
        assert_eq!(q.pop(), None);
        assert!(q.ids().is_empty());
    }
}
