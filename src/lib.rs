//! chainwatch: multi-chain deposit/withdrawal confirmation tracking.
//!
//! Watches chains (through a [`adapter::ChainAdapter`]) for transactions
//! touching a registered address set and turns block data into an ordered
//! stream of lifecycle events: initial observation, one update per
//! confirmation round, and a terminal confirm or fail once enough blocks
//! have accumulated. Progress is checkpointed after every height so a
//! restart replays missed blocks deterministically instead of re-announcing
//! settled transfers.

pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod types;

pub use adapter::ChainAdapter;
pub use config::ChainConfig;
pub use error::{ErrorHandler, WatchError};
pub use runtime::{ChainWatcher, EventHandler};
pub use store::{Checkpoint, CheckpointStore, MemoryStore, SledStore};
pub use types::{ChainEvent, EventKind, TxSummary};
