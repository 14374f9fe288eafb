use std::collections::VecDeque;

use super::changes::ChangeBatch;

/// Bounded FIFO of published batches; the oldest is evicted when full.
#[derive(Debug, Clone, Default)]
pub struct ChangeHistory {
    batches: VecDeque<ChangeBatch>,
    capacity: usize,
}

impl ChangeHistory {
    /// A capacity of zero disables history.
    pub fn new(capacity: usize) -> Self {
        Self {
            batches: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, batch: ChangeBatch) {
        if self.capacity == 0 {
            return;
        }
        while self.batches.len() >= self.capacity {
            self.batches.pop_front();
        }
        self.batches.push_back(batch);
    }

    /// Batches oldest first.
    pub fn batches(&self) -> Vec<ChangeBatch> {
        self.batches.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
