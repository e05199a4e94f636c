use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info, trace};
use tokio::sync::{mpsc, oneshot, watch};

use super::EventHandler;
use crate::adapter::ChainAdapter;
use crate::config::ChainConfig;
use crate::engine::{ChainEngine, SweepCommand};
use crate::error::{ErrorHandler, WatchError};
use crate::registry::AddressRegistry;
use crate::store::{Checkpoint, CheckpointStore};
use crate::types::{ChainEvent, TxSummary};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The cooperative loop for one chain.
///
/// Owns all mutable lifecycle state (queues, id counter, current height)
/// exclusively; the only shared pieces are the address registry (mutex, fed
/// by the external registration API) and the current-height atomic the
/// watcher reads when reporting registration heights.
///
/// Two producers feed the loop: the adapter's height notifications, and the
/// loop's own outbound event queue, consumed here so a slow downstream
/// handler cannot stall classification of the next height.
pub(crate) struct ChainRuntime {
    pub(crate) engine: ChainEngine,
    pub(crate) config: ChainConfig,
    pub(crate) registry: Arc<AddressRegistry>,
    pub(crate) adapter: Arc<dyn ChainAdapter>,
    pub(crate) store: Arc<dyn CheckpointStore>,
    pub(crate) on_event: EventHandler,
    pub(crate) on_error: Option<ErrorHandler>,
    pub(crate) heights: mpsc::Receiver<i64>,
    pub(crate) outbound_tx: mpsc::UnboundedSender<ChainEvent>,
    pub(crate) outbound_rx: mpsc::UnboundedReceiver<ChainEvent>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) done: Option<oneshot::Sender<()>>,
    pub(crate) current_height: Arc<AtomicI64>,
    /// Last durably checkpointed height, if any; seeds the backfill window.
    pub(crate) endpoint: Option<i64>,
    pub(crate) backfill_done: bool,
}

impl ChainRuntime {
    pub(crate) async fn run(mut self) {
        info!(
            "[CHAIN] {} loop started at height {} (next id {})",
            self.engine.chain(),
            self.engine.height(),
            self.engine.next_event_id()
        );

        let mut prune = tokio::time::interval(self.config.prune_interval);
        prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        prune.tick().await;

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = prune.tick() => {
                    self.engine.prune_seen(now_ms(), self.config.seen_ttl.as_millis() as i64);
                }
                maybe = self.heights.recv() => match maybe {
                    Some(height) => self.on_height(height).await,
                    // Height feed closed: the adapter subscription ended.
                    None => break,
                },
                Some(event) = self.outbound_rx.recv() => self.deliver(event),
            }
        }

        self.finish();
    }

    async fn on_height(&mut self, height: i64) {
        if !self.backfill_done {
            self.backfill(height).await;
            self.backfill_done = true;
        }

        if height <= self.engine.height() {
            // Duplicate or stale notification; tolerated as a no-op.
            trace!("[CHAIN] {} ignoring height {} (at {})", self.engine.chain(), height, self.engine.height());
            return;
        }

        // Fetch before advancing: a failed fetch leaves the height untouched
        // so the block is retried on the next notification.
        let txs = match self.adapter.transactions_at(height).await {
            Ok(txs) => txs,
            Err(source) => {
                self.report(WatchError::Adapter { height, source });
                return;
            }
        };

        self.engine.advance_to(height);
        self.current_height.store(height, Ordering::SeqCst);
        info!("[CHAIN] {} processing block {} ({} txs)", self.engine.chain(), height, txs.len());

        let watched = self.registry.snapshot();
        self.archive_matched(height, &txs, &watched);
        for event in self.engine.observe(&watched, height, &txs, false, now_ms()) {
            self.queue(event);
        }
        self.run_sweep().await;

        let checkpoint = Checkpoint {
            height,
            next_event_id: self.engine.next_event_id(),
        };
        if let Err(err) = self.store.save_progress(self.engine.chain(), &checkpoint) {
            // Best-effort durability: a missed write re-derives from the
            // last successful checkpoint plus backfill after a restart.
            self.report(err);
        }
    }

    /// One-shot catch-up for blocks that elapsed while the process was not
    /// running: replays `[endpoint - confirm_times, head)` through
    /// classification with `backfilled = true`, then lets the sweep
    /// synthesize each affected entry's full lifecycle.
    async fn backfill(&mut self, head: i64) {
        let Some(endpoint) = self.endpoint else {
            return;
        };
        // A non-positive endpoint means the chain was never synced; there is
        // no history of ours to catch up on.
        if endpoint <= 0 {
            return;
        }
        let from = (endpoint - self.config.confirm_times).max(0);
        if from >= head {
            return;
        }

        info!("[CHAIN] {} backfilling heights [{}, {})", self.engine.chain(), from, head);
        let watched = self.registry.snapshot();
        for height in from..head {
            match self.adapter.transactions_at(height).await {
                Ok(txs) => {
                    self.archive_matched(height, &txs, &watched);
                    for event in self.engine.observe(&watched, height, &txs, true, now_ms()) {
                        self.queue(event);
                    }
                }
                // A block we cannot fetch during catch-up is skipped, not
                // retried; the live path owns everything from `head` on.
                Err(source) => self.report(WatchError::Adapter { height, source }),
            }
        }
        self.run_sweep().await;
    }

    /// Archive the block's transactions that touch a watched address.
    /// Blocks with no match leave no record.
    fn archive_matched(&self, height: i64, txs: &[TxSummary], watched: &HashMap<String, i64>) {
        let matched: Vec<TxSummary> = txs
            .iter()
            .filter(|tx| watched.contains_key(&tx.from) || watched.contains_key(&tx.to))
            .cloned()
            .collect();
        if matched.is_empty() {
            return;
        }
        if let Err(err) = self.store.save_block(self.engine.chain(), height, &matched) {
            self.report(err);
        }
    }

    async fn run_sweep(&mut self) {
        for cmd in self.engine.sweep() {
            match cmd {
                SweepCommand::Emit(event) => self.queue(event),
                SweepCommand::Verify { direction, entry } => {
                    let observable = self.adapter.verify(&entry.tx).await;
                    if let Some(event) = self.engine.resolve_confirm(direction, entry, observable) {
                        self.queue(event);
                    }
                }
            }
        }
    }

    fn queue(&mut self, event: ChainEvent) {
        debug!(
            "[CHAIN] {} event: {}",
            self.engine.chain(),
            serde_json::to_string(&event).unwrap_or_default()
        );
        // Unbounded on purpose: the loop is also the consumer, so a bounded
        // queue could deadlock against itself under burst.
        let _ = self.outbound_tx.send(event);
    }

    fn deliver(&self, event: ChainEvent) {
        (self.on_event)(self.engine.chain(), event);
    }

    fn report(&self, err: WatchError) {
        error!("[CHAIN] {} {}", self.engine.chain(), err);
        if let Some(handler) = &self.on_error {
            handler(&err);
        }
    }

    fn finish(&mut self) {
        // Drain-before-exit: everything already decided gets delivered.
        while let Ok(event) = self.outbound_rx.try_recv() {
            self.deliver(event);
        }

        // A loop that recovered nothing and processed nothing has no
        // progress to record; writing height 0 here would read as a real
        // endpoint on the next start and trigger a genesis-wide catch-up.
        if self.engine.height() > 0 || self.endpoint.is_some() {
            let checkpoint = Checkpoint {
                height: self.engine.height(),
                next_event_id: self.engine.next_event_id(),
            };
            if let Err(err) = self.store.save_progress(self.engine.chain(), &checkpoint) {
                self.report(err);
            }
        }
        if let Err(err) = self.store.save_addresses(self.engine.chain(), &self.registry.snapshot()) {
            self.report(err);
        }

        info!("[CHAIN] {} stopped, endpoint {}", self.engine.chain(), self.engine.height());
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}
