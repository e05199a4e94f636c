use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::ChainAdapter;
use crate::types::TxSummary;

/// Scripted in-memory chain for tests and the demo binary.
///
/// Blocks are staged with [`MockChain::put_block`], the head is advanced by
/// pushing heights, and failure modes (unfetchable blocks, unverifiable
/// transactions) are injected per height / per hash.
pub struct MockChain {
    id: String,
    blocks: Mutex<HashMap<i64, Vec<TxSummary>>>,
    unverifiable: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<i64>>,
    feed_tx: mpsc::Sender<i64>,
    feed_rx: Mutex<Option<mpsc::Receiver<i64>>>,
}

impl MockChain {
    pub fn new(id: impl Into<String>) -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(64);
        Self {
            id: id.into(),
            blocks: Mutex::new(HashMap::new()),
            unverifiable: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            feed_tx,
            feed_rx: Mutex::new(Some(feed_rx)),
        }
    }

    /// Stage the transaction list for a block.
    pub fn put_block(&self, height: i64, txs: Vec<TxSummary>) {
        self.blocks.lock().unwrap().insert(height, txs);
    }

    /// Announce a new head height to whoever subscribed.
    pub async fn push_height(&self, height: i64) {
        self.feed_tx.send(height).await.expect("height feed closed");
    }

    /// Make `verify` answer false for this hash.
    pub fn mark_unverifiable(&self, hash: &str) {
        self.unverifiable.lock().unwrap().insert(hash.to_string());
    }

    /// Make `transactions_at` fail for this height until cleared.
    pub fn fail_at(&self, height: i64) {
        self.failing.lock().unwrap().insert(height);
    }

    pub fn clear_failure(&self, height: i64) {
        self.failing.lock().unwrap().remove(&height);
    }
}

#[async_trait]
impl ChainAdapter for MockChain {
    fn chain_id(&self) -> &str {
        &self.id
    }

    async fn subscribe_heights(&self, heights: mpsc::Sender<i64>) -> Result<()> {
        let mut feed = self
            .feed_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("mock chain already subscribed"))?;
        while let Some(h) = feed.recv().await {
            if heights.send(h).await.is_err() {
                // Runtime went away; subscription is over.
                break;
            }
        }
        Ok(())
    }

    async fn transactions_at(&self, height: i64) -> Result<Vec<TxSummary>> {
        if self.failing.lock().unwrap().contains(&height) {
            bail!("injected fetch failure at height {height}");
        }
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    async fn verify(&self, tx: &TxSummary) -> bool {
        !self.unverifiable.lock().unwrap().contains(&tx.hash)
    }
}
