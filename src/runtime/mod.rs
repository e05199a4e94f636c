//! Runtime shell.
//!
//! [`ChainWatcher`] is the public surface: register chains and addresses,
//! start the per-chain loops, stop or reset them. Each chain gets its own
//! [`chain::ChainRuntime`] loop owning the engine state exclusively;
//! cancellation fans out over per-chain watch channels and `stop` joins on
//! per-chain oneshot acknowledgements.

pub(crate) mod chain;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use log::{error, info};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::adapter::ChainAdapter;
use crate::config::ChainConfig;
use crate::engine::ChainEngine;
use crate::error::{ErrorHandler, WatchError};
use crate::registry::AddressRegistry;
use crate::store::{CheckpointStore, SledStore};
use crate::types::ChainEvent;

/// Downstream event sink: `(chain id, event)`.
pub type EventHandler = Arc<dyn Fn(&str, ChainEvent) + Send + Sync>;

struct ChainHandle {
    config: ChainConfig,
    adapter: Arc<dyn ChainAdapter>,
    registry: Arc<AddressRegistry>,
    current_height: Arc<AtomicI64>,
    shutdown: watch::Sender<bool>,
    done: Option<oneshot::Receiver<()>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Multi-chain confirmation watcher.
pub struct ChainWatcher {
    store: Arc<dyn CheckpointStore>,
    chains: HashMap<String, ChainHandle>,
    on_error: Option<ErrorHandler>,
    started: bool,
}

impl ChainWatcher {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            chains: HashMap::new(),
            on_error: None,
            started: false,
        }
    }

    /// Watcher backed by a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        Ok(Self::new(Arc::new(SledStore::open(path)?)))
    }

    /// Install a callback for non-fatal errors raised inside chain loops.
    pub fn set_error_handler(&mut self, handler: ErrorHandler) {
        self.on_error = Some(handler);
    }

    /// Register a chain with its adapter. Recovers the persisted address set
    /// and checkpoint for the chain; errors on duplicate registration.
    pub fn register_chain(
        &mut self,
        config: ChainConfig,
        adapter: Arc<dyn ChainAdapter>,
    ) -> Result<(), WatchError> {
        config.validate()?;
        if config.chain != adapter.chain_id() {
            return Err(WatchError::ChainMismatch {
                config: config.chain.clone(),
                adapter: adapter.chain_id().to_string(),
            });
        }
        let id = adapter.chain_id().to_string();
        if self.chains.contains_key(&id) {
            return Err(WatchError::DuplicateChain(id));
        }

        let state = self.store.load(&id)?;
        let height = state.checkpoint.map(|c| c.height).unwrap_or(0);
        info!(
            "[WATCHER] registered chain {} (endpoint {:?}, {} addresses)",
            id,
            state.checkpoint.map(|c| c.height),
            state.addresses.len()
        );

        let (shutdown, _) = watch::channel(false);
        self.chains.insert(
            id,
            ChainHandle {
                config,
                adapter,
                registry: Arc::new(AddressRegistry::seed(state.addresses)),
                current_height: Arc::new(AtomicI64::new(height)),
                shutdown,
                done: None,
                tasks: Vec::new(),
            },
        );
        Ok(())
    }

    /// Add watched addresses to a chain, reporting each address's effective
    /// registration height. Idempotent per address; the updated set is
    /// persisted immediately so a restart does not forget it.
    pub fn watch_addresses(
        &self,
        chain: &str,
        addresses: &[String],
    ) -> Result<HashMap<String, i64>, WatchError> {
        let handle = self
            .chains
            .get(chain)
            .ok_or_else(|| WatchError::UnknownChain(chain.to_string()))?;
        let height = handle.current_height.load(Ordering::SeqCst);
        let out = handle.registry.register(addresses, height);
        self.store.save_addresses(chain, &handle.registry.snapshot())?;
        Ok(out)
    }

    /// Spawn the subscription task and the engine loop for every registered
    /// chain. Engine state is recovered from the store at this point, so a
    /// stopped watcher can be started again and resume from its checkpoints.
    pub fn start(&mut self, on_event: EventHandler) -> Result<(), WatchError> {
        if self.started {
            return Err(WatchError::AlreadyStarted);
        }

        for (id, handle) in &mut self.chains {
            // A previous stop() left the flag raised; lower it for the new loop.
            let _ = handle.shutdown.send(false);
            let state = self.store.load(id)?;
            let engine = ChainEngine::new(
                id.clone(),
                handle.config.confirm_times,
                state.checkpoint.map(|c| c.height).unwrap_or(0),
                state.checkpoint.map(|c| c.next_event_id).unwrap_or(1),
            );

            let (heights_tx, heights_rx) = mpsc::channel(1024);
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (done_tx, done_rx) = oneshot::channel();
            handle.done = Some(done_rx);

            let subscriber = handle.adapter.clone();
            let sub_id = id.clone();
            handle.tasks.push(tokio::spawn(async move {
                if let Err(err) = subscriber.subscribe_heights(heights_tx).await {
                    error!("[WATCHER] {sub_id} height subscription failed: {err}");
                }
            }));

            let runtime = chain::ChainRuntime {
                engine,
                config: handle.config.clone(),
                registry: handle.registry.clone(),
                adapter: handle.adapter.clone(),
                store: self.store.clone(),
                on_event: on_event.clone(),
                on_error: self.on_error.clone(),
                heights: heights_rx,
                outbound_tx,
                outbound_rx,
                shutdown: handle.shutdown.subscribe(),
                done: Some(done_tx),
                current_height: handle.current_height.clone(),
                endpoint: state.checkpoint.map(|c| c.height),
                backfill_done: false,
            };
            handle.tasks.push(tokio::spawn(runtime.run()));
        }

        self.started = true;
        Ok(())
    }

    /// Cancel every chain loop and wait for each to acknowledge shutdown.
    /// Loops persist a final checkpoint (progress and addresses) on the way
    /// out. The watcher can be started again afterwards.
    pub async fn stop(&mut self) {
        for (id, handle) in &mut self.chains {
            let _ = handle.shutdown.send(true);
            if let Some(done) = handle.done.take() {
                let _ = done.await;
            }
            for task in handle.tasks.drain(..) {
                task.abort();
            }
            info!("[WATCHER] chain {id} shut down");
        }
        self.started = false;
    }

    /// Permanently retire a chain: stop its loop and delete its persisted
    /// checkpoint and address records.
    pub async fn reset(&mut self, chain: &str) -> Result<(), WatchError> {
        let mut handle = self
            .chains
            .remove(chain)
            .ok_or_else(|| WatchError::UnknownChain(chain.to_string()))?;
        let _ = handle.shutdown.send(true);
        if let Some(done) = handle.done.take() {
            let _ = done.await;
        }
        for task in handle.tasks.drain(..) {
            task.abort();
        }
        self.store.clear(chain)?;
        info!("[WATCHER] chain {chain} reset");
        Ok(())
    }
}
