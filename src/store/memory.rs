use std::collections::HashMap;
use std::sync::Mutex;

use super::{ChainState, Checkpoint, CheckpointStore};
use crate::error::WatchError;
use crate::types::TxSummary;

/// In-process store, used by tests and throwaway runs. Shares the
/// [`CheckpointStore`] contract with [`super::SledStore`] so a restart within
/// one process (new watcher, same store handle) exercises the real recovery
/// path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, ChainState>>,
    blocks: Mutex<HashMap<(String, i64), Vec<TxSummary>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryStore {
    fn load(&self, chain: &str) -> Result<ChainState, WatchError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .get(chain)
            .cloned()
            .unwrap_or_default())
    }

    fn save_progress(&self, chain: &str, checkpoint: &Checkpoint) -> Result<(), WatchError> {
        let mut map = self.inner.lock().unwrap();
        map.entry(chain.to_string()).or_default().checkpoint = Some(*checkpoint);
        Ok(())
    }

    fn save_addresses(&self, chain: &str, addresses: &HashMap<String, i64>) -> Result<(), WatchError> {
        let mut map = self.inner.lock().unwrap();
        map.entry(chain.to_string()).or_default().addresses = addresses.clone();
        Ok(())
    }

    fn save_block(&self, chain: &str, height: i64, txs: &[TxSummary]) -> Result<(), WatchError> {
        self.blocks
            .lock()
            .unwrap()
            .insert((chain.to_string(), height), txs.to_vec());
        Ok(())
    }

    fn load_block(&self, chain: &str, height: i64) -> Result<Option<Vec<TxSummary>>, WatchError> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&(chain.to_string(), height))
            .cloned())
    }

    fn clear(&self, chain: &str) -> Result<(), WatchError> {
        self.inner.lock().unwrap().remove(chain);
        self.blocks.lock().unwrap().retain(|(c, _), _| c != chain);
        Ok(())
    }
}
