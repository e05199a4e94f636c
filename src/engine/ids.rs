/// Per-chain event id allocator.
///
/// Enqueuing a pending entry reserves `confirm_times` consecutive ids as that
/// entry's private range: the initial event uses the first id and each later
/// lifecycle step advances by 1, so a full lifecycle of one initial event,
/// `confirm_times - 2` updates and one terminal event exactly fills the
/// range. The counter is persisted in the checkpoint and never rewound.
#[derive(Debug, Clone, Copy)]
pub struct EventIdAllocator {
    next: i64,
}

impl EventIdAllocator {
    /// Seed from a persisted checkpoint. Ids start at 1 on a fresh chain.
    pub fn seed(next: i64) -> Self {
        Self { next: next.max(1) }
    }

    /// Reserve a block of `count` ids, returning the first.
    pub fn reserve(&mut self, count: i64) -> i64 {
        let first = self.next;
        self.next += count;
        first
    }

    /// Reserve a single id (one-shot terminal events).
    pub fn reserve_one(&mut self) -> i64 {
        self.reserve(1)
    }

    pub fn next_id(&self) -> i64 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_contiguous_blocks() {
        let mut ids = EventIdAllocator::seed(1);
        assert_eq!(ids.reserve(3), 1);
        assert_eq!(ids.reserve(3), 4);
        assert_eq!(ids.reserve_one(), 7);
        assert_eq!(ids.next_id(), 8);
    }

    #[test]
    fn never_seeds_below_one() {
        let ids = EventIdAllocator::seed(0);
        assert_eq!(ids.next_id(), 1);
    }
}
