//! Chain adapter seam.
//!
//! The core never talks to a node directly; everything it needs from a chain
//! comes through [`ChainAdapter`]. One implementation per chain family, the
//! core never branches on the concrete type.

pub mod mock;

pub use mock::MockChain;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::TxSummary;

/// Minimal chain interface used by the runtime. Everything is height-based.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Identity string for this chain, also the storage namespace.
    fn chain_id(&self) -> &str;

    /// Stream new head heights into `heights` until the sender's receiver is
    /// dropped. May deliver the same height more than once; the runtime
    /// treats non-advancing heights as no-ops.
    async fn subscribe_heights(&self, heights: mpsc::Sender<i64>) -> Result<()>;

    /// All transactions in the block at `height`. A failure here is
    /// transient: the runtime reports it and retries on the next
    /// notification without advancing.
    async fn transactions_at(&self, height: i64) -> Result<Vec<TxSummary>>;

    /// Re-check that a transaction is still observable on-chain. Called once
    /// per entry, right before its confirm event.
    async fn verify(&self, tx: &TxSummary) -> bool;
}
