//! Checkpoint persistence.
//!
//! The engine only needs a tiny durable record per chain: the last processed
//! height, the next event id, and the watched-address map. The on-disk
//! encoding is the store implementation's concern; the runtime talks to the
//! [`CheckpointStore`] trait so tests can swap in [`MemoryStore`].

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::types::TxSummary;

/// Progress record written after every processed height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: i64,
    pub next_event_id: i64,
}

/// Everything recovered for one chain at startup.
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    pub checkpoint: Option<Checkpoint>,
    pub addresses: HashMap<String, i64>,
}

/// Durable read/write contract for per-chain recovery state.
///
/// `save_progress` is called after every processed height and must never
/// regress `next_event_id` below an id already handed out; callers only ever
/// pass monotonically advancing values. `clear` permanently retires a chain.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, chain: &str) -> Result<ChainState, WatchError>;
    fn save_progress(&self, chain: &str, checkpoint: &Checkpoint) -> Result<(), WatchError>;
    fn save_addresses(&self, chain: &str, addresses: &HashMap<String, i64>) -> Result<(), WatchError>;

    /// Archive the matched transactions of one block. Only called with a
    /// non-empty list; blocks touching no watched address leave no record.
    fn save_block(&self, chain: &str, height: i64, txs: &[TxSummary]) -> Result<(), WatchError>;
    fn load_block(&self, chain: &str, height: i64) -> Result<Option<Vec<TxSummary>>, WatchError>;

    fn clear(&self, chain: &str) -> Result<(), WatchError>;
}
