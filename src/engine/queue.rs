use std::collections::VecDeque;

use crate::types::TxSummary;

/// One tracked lifecycle: a transaction waiting out its confirmations on one
/// side (deposit or withdraw). A transfer between two watched addresses
/// produces two independent copies, one per queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub tx: TxSummary,
    /// Block height where the transaction was observed.
    pub height: i64,
    /// Position within the block, kept for tie-breaking and diagnostics.
    pub index: i64,
    /// Current position inside the entry's reserved id block. Advances by 1
    /// per update step.
    pub event_id: i64,
    /// Entry produced by catch-up replay; its whole lifecycle is synthesized
    /// in one sweep pass.
    pub backfilled: bool,
}

/// Ordered append/pop-front queue of pending entries.
#[derive(Debug, Default)]
pub struct PendingQueue {
    data: VecDeque<Pending>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, entry: Pending) {
        self.data.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<Pending> {
        self.data.pop_front()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
