//! Confirmation state machine.
//!
//! This is the pure core of the watcher:
//! - No network
//! - No async
//! - No IO
//! - Fully deterministic
//!
//! It consumes observed blocks and height advances, and emits `SweepCommand`s
//! for the runtime shell to execute. The one side effect it cannot decide on
//! its own, re-checking a transaction on-chain before confirming, is handed
//! back as a `Verify` command; the shell answers via [`ChainEngine::resolve_confirm`].

pub mod ids;
pub mod queue;


use std::collections::HashMap;

use log::{debug, trace};

use crate::types::{ChainEvent, Direction, EventKind, TxSummary};
use ids::EventIdAllocator;
use queue::{Pending, PendingQueue};

/// Side effects requested by a sweep pass.
#[derive(Debug)]
pub enum SweepCommand {
    /// Deliver this event downstream.
    Emit(ChainEvent),
    /// Entry reached its confirmation count; the shell must re-check the
    /// transaction is still observable on-chain, then call
    /// `resolve_confirm` with the answer. The entry has already left its
    /// queue.
    Verify { direction: Direction, entry: Pending },
}

/// Per-chain confirmation tracking state.
///
/// Owned exclusively by one chain loop; nothing in here is synchronized.
#[derive(Debug)]
pub struct ChainEngine {
    chain: String,
    confirm_times: i64,
    height: i64,
    ids: EventIdAllocator,
    /// Recently classified hashes (hash -> observation time, ms) used to
    /// suppress re-enqueueing on duplicate observations.
    seen: HashMap<String, i64>,
    deposits: PendingQueue,
    withdrawals: PendingQueue,
}

impl ChainEngine {
    /// Build an engine resuming from checkpointed state. A fresh chain
    /// passes `height = 0` and `next_event_id = 1`.
    pub fn new(chain: impl Into<String>, confirm_times: i64, height: i64, next_event_id: i64) -> Self {
        Self {
            chain: chain.into(),
            confirm_times,
            height,
            ids: EventIdAllocator::seed(next_event_id),
            seen: HashMap::new(),
            deposits: PendingQueue::new(),
            withdrawals: PendingQueue::new(),
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn next_event_id(&self) -> i64 {
        self.ids.next_id()
    }

    pub fn pending(&self) -> (usize, usize) {
        (self.deposits.len(), self.withdrawals.len())
    }

    /// Advance to a newly observed height. Returns false (and changes
    /// nothing) for heights that do not advance, so duplicate notifications
    /// are no-ops.
    pub fn advance_to(&mut self, height: i64) -> bool {
        if height <= self.height {
            trace!("[ENGINE] {} stale height {} (at {})", self.chain, height, self.height);
            return false;
        }
        self.height = height;
        true
    }

    /// Classify one block's transactions against the watched-address set.
    ///
    /// Matching transactions are enqueued for lifecycle tracking; each
    /// enqueue reserves a private `confirm_times`-sized id block. The only
    /// events produced here are `SelfTransferError` anomalies, which are
    /// terminal and never enqueued.
    pub fn observe(
        &mut self,
        watched: &HashMap<String, i64>,
        height: i64,
        txs: &[TxSummary],
        backfilled: bool,
        now_ms: i64,
    ) -> Vec<ChainEvent> {
        let mut events = Vec::new();

        for (i, tx) in txs.iter().enumerate() {
            let is_sender = watched.contains_key(&tx.from);
            let is_receiver = watched.contains_key(&tx.to);
            if !is_sender && !is_receiver {
                continue;
            }
            if self.seen.contains_key(&tx.hash) {
                trace!("[ENGINE] {} skip duplicate tx {}", self.chain, tx.hash);
                continue;
            }
            self.seen.insert(tx.hash.clone(), now_ms);

            if tx.from == tx.to {
                // A watched address paying itself is a data anomaly, not a
                // transfer; surface it immediately and track nothing.
                let id = self.ids.reserve_one();
                events.push(self.event(EventKind::SelfTransferError, id, tx.clone()));
                continue;
            }

            if is_sender {
                self.enqueue(Direction::Withdraw, tx, height, i as i64, backfilled);
            }
            if is_receiver {
                self.enqueue(Direction::Deposit, tx, height, i as i64, backfilled);
            }
        }

        events
    }

    fn enqueue(&mut self, direction: Direction, tx: &TxSummary, height: i64, index: i64, backfilled: bool) {
        let event_id = self.ids.reserve(self.confirm_times);
        let entry = Pending {
            tx: tx.clone(),
            height,
            index,
            event_id,
            backfilled,
        };
        debug!(
            "[ENGINE] {} enqueue {:?} {} at height {} ids [{}, {}]",
            self.chain,
            direction,
            tx.hash,
            height,
            event_id,
            event_id + self.confirm_times - 1
        );
        match direction {
            Direction::Deposit => self.deposits.push_back(entry),
            Direction::Withdraw => self.withdrawals.push_back(entry),
        }
    }

    /// Run one lifecycle step for every pending entry at the current height.
    ///
    /// Call exactly once per newly observed height, after `observe`, so each
    /// entry takes at most one step per confirmation round. Entries
    /// re-enqueued during the pass are not revisited in the same pass.
    pub fn sweep(&mut self) -> Vec<SweepCommand> {
        let mut out = Vec::new();
        self.sweep_queue(Direction::Deposit, &mut out);
        self.sweep_queue(Direction::Withdraw, &mut out);
        out
    }

    fn sweep_queue(&mut self, direction: Direction, out: &mut Vec<SweepCommand>) {
        let n = match direction {
            Direction::Deposit => self.deposits.len(),
            Direction::Withdraw => self.withdrawals.len(),
        };

        for _ in 0..n {
            let mut entry = match direction {
                Direction::Deposit => self.deposits.pop_front(),
                Direction::Withdraw => self.withdrawals.pop_front(),
            }
            .expect("queue length snapshot");

            if entry.backfilled {
                // Already happened while we were offline; replay the whole
                // lifecycle deterministically and retire the entry.
                let mut event = self.event(EventKind::initial(direction), entry.event_id, entry.tx.clone());
                out.push(SweepCommand::Emit(event.clone()));
                for _ in 0..self.confirm_times - 2 {
                    event = event.next(EventKind::update(direction));
                    out.push(SweepCommand::Emit(event.clone()));
                }
                out.push(SweepCommand::Emit(event.next(EventKind::confirm(direction))));
                continue;
            }

            let delta = self.height - entry.height;
            if delta + 1 >= self.confirm_times {
                // Due for finality; the shell re-checks observability first.
                out.push(SweepCommand::Verify { direction, entry });
            } else if delta == 0 {
                // The height where the entry was first seen.
                let event = self.event(EventKind::initial(direction), entry.event_id, entry.tx.clone());
                out.push(SweepCommand::Emit(event));
                self.requeue(direction, entry);
            } else {
                entry.event_id += 1;
                let event = self.event(EventKind::update(direction), entry.event_id, entry.tx.clone());
                out.push(SweepCommand::Emit(event));
                self.requeue(direction, entry);
            }
        }
    }

    fn requeue(&mut self, direction: Direction, entry: Pending) {
        match direction {
            Direction::Deposit => self.deposits.push_back(entry),
            Direction::Withdraw => self.withdrawals.push_back(entry),
        }
    }

    /// Terminal transition for an entry handed back by a `Verify` command.
    ///
    /// An observable transaction confirms. An unobservable deposit is
    /// dropped with no event (never falsely confirm); an unobservable
    /// withdrawal fails loudly.
    pub fn resolve_confirm(
        &mut self,
        direction: Direction,
        entry: Pending,
        observable: bool,
    ) -> Option<ChainEvent> {
        let id = entry.event_id + 1;
        match (direction, observable) {
            (_, true) => Some(self.event(EventKind::confirm(direction), id, entry.tx)),
            (Direction::Withdraw, false) => Some(self.event(EventKind::WithdrawFail, id, entry.tx)),
            (Direction::Deposit, false) => {
                debug!("[ENGINE] {} drop unverifiable deposit {}", self.chain, entry.tx.hash);
                None
            }
        }
    }

    /// Evict hashes older than `ttl_ms` from the duplicate-suppression
    /// window. Driven by the runtime's prune timer.
    pub fn prune_seen(&mut self, now_ms: i64, ttl_ms: i64) {
        let before = self.seen.len();
        self.seen.retain(|_, at| now_ms - *at <= ttl_ms);
        let evicted = before - self.seen.len();
        if evicted > 0 {
            trace!("[ENGINE] {} pruned {} stale tx hashes", self.chain, evicted);
        }
    }

    fn event(&self, kind: EventKind, id: i64, tx: TxSummary) -> ChainEvent {
        ChainEvent {
            chain: self.chain.clone(),
            kind,
            id,
            tx,
        }
    }
}
