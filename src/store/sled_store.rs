use std::collections::HashMap;
use std::path::Path;

use log::info;

use super::{ChainState, Checkpoint, CheckpointStore};
use crate::error::WatchError;
use crate::types::TxSummary;

/// Embedded KV store for checkpoints, one `sled` database for all chains.
///
/// Keys are namespaced by the adapter-reported chain id:
/// `{chain}/checkpoint` and `{chain}/addresses`, both JSON-encoded.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let db = sled::open(path.as_ref())?;
        info!("[STORE] opened checkpoint db at {}", path.as_ref().display());
        Ok(Self { db })
    }

    fn checkpoint_key(chain: &str) -> String {
        format!("{chain}/checkpoint")
    }

    fn addresses_key(chain: &str) -> String {
        format!("{chain}/addresses")
    }

    // Zero-padded so block keys iterate in height order under scan_prefix.
    fn block_key(chain: &str, height: i64) -> String {
        format!("{chain}/block/{height:012}")
    }
}

impl CheckpointStore for SledStore {
    fn load(&self, chain: &str) -> Result<ChainState, WatchError> {
        let checkpoint = match self.db.get(Self::checkpoint_key(chain))? {
            Some(raw) => Some(serde_json::from_slice::<Checkpoint>(&raw)?),
            None => None,
        };
        let addresses = match self.db.get(Self::addresses_key(chain))? {
            Some(raw) => serde_json::from_slice::<HashMap<String, i64>>(&raw)?,
            None => HashMap::new(),
        };
        Ok(ChainState {
            checkpoint,
            addresses,
        })
    }

    fn save_progress(&self, chain: &str, checkpoint: &Checkpoint) -> Result<(), WatchError> {
        let raw = serde_json::to_vec(checkpoint)?;
        self.db.insert(Self::checkpoint_key(chain), raw)?;
        Ok(())
    }

    fn save_addresses(&self, chain: &str, addresses: &HashMap<String, i64>) -> Result<(), WatchError> {
        let raw = serde_json::to_vec(addresses)?;
        self.db.insert(Self::addresses_key(chain), raw)?;
        Ok(())
    }

    fn save_block(&self, chain: &str, height: i64, txs: &[TxSummary]) -> Result<(), WatchError> {
        let raw = serde_json::to_vec(txs)?;
        self.db.insert(Self::block_key(chain, height), raw)?;
        Ok(())
    }

    fn load_block(&self, chain: &str, height: i64) -> Result<Option<Vec<TxSummary>>, WatchError> {
        match self.db.get(Self::block_key(chain, height))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn clear(&self, chain: &str) -> Result<(), WatchError> {
        // Everything for a chain lives under one key prefix: checkpoint,
        // addresses, and the archived blocks.
        let prefix = format!("{chain}/");
        for item in self.db.scan_prefix(&prefix) {
            let (key, _) = item?;
            self.db.remove(key)?;
        }
        self.db.flush()?;
        info!("[STORE] cleared state for chain {chain}");
        Ok(())
    }
}
