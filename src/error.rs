use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the watcher. None of these are fatal to a running
/// chain loop; transient ones are reported through the injected handler and
/// processing continues.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("chain {0} is not registered")]
    UnknownChain(String),

    #[error("chain {0} is already registered")]
    DuplicateChain(String),

    #[error("config chain {config} does not match adapter identity {adapter}")]
    ChainMismatch { config: String, adapter: String },

    #[error("confirm_times must be at least 2, got {0}")]
    InvalidConfirmTimes(i64),

    #[error("watcher already started")]
    AlreadyStarted,

    #[error("adapter error at height {height}: {source}")]
    Adapter {
        height: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("storage error: {0}")]
    Store(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Injected callback for non-fatal errors raised inside a chain loop.
pub type ErrorHandler = Arc<dyn Fn(&WatchError) + Send + Sync>;
