use serde::{Deserialize, Serialize};

/// Flat summary of a chain transaction as reported by an adapter.
///
/// All fields are strings: amounts and fees stay in whatever decimal
/// representation the chain adapter produced, and the core never does
/// arithmetic on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub fee: String,
    pub amount: String,
}

/// Which side of a transfer a pending entry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Deposit,
    Withdraw,
}

/// Lifecycle event kinds emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    // Normal lifecycle
    Deposit,
    DepositUpdate,
    DepositConfirm,
    Withdraw,
    WithdrawUpdate,
    WithdrawConfirm,

    // Abnormal terminals
    WithdrawFail,
    SelfTransferError,
}

impl EventKind {
    /// Initial event for a freshly observed entry.
    pub fn initial(direction: Direction) -> Self {
        match direction {
            Direction::Deposit => EventKind::Deposit,
            Direction::Withdraw => EventKind::Withdraw,
        }
    }

    /// Per-confirmation progress event.
    pub fn update(direction: Direction) -> Self {
        match direction {
            Direction::Deposit => EventKind::DepositUpdate,
            Direction::Withdraw => EventKind::WithdrawUpdate,
        }
    }

    /// Terminal success event.
    pub fn confirm(direction: Direction) -> Self {
        match direction {
            Direction::Deposit => EventKind::DepositConfirm,
            Direction::Withdraw => EventKind::WithdrawConfirm,
        }
    }

    /// True for kinds after which the entry leaves its queue.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::DepositConfirm
                | EventKind::WithdrawConfirm
                | EventKind::WithdrawFail
                | EventKind::SelfTransferError
        )
    }
}

/// One emitted lifecycle event. Immutable once constructed; `id` values form
/// a strictly increasing sequence per chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub chain: String,
    pub kind: EventKind,
    pub id: i64,
    pub tx: TxSummary,
}

impl ChainEvent {
    /// Successor event in the same lifecycle: same payload, next id.
    pub fn next(&self, kind: EventKind) -> ChainEvent {
        ChainEvent {
            chain: self.chain.clone(),
            kind,
            id: self.id + 1,
            tx: self.tx.clone(),
        }
    }
}
