use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapter::{ChainAdapter, MockChain};
use crate::config::ChainConfig;
use crate::error::WatchError;
use crate::runtime::ChainWatcher;
use crate::store::{CheckpointStore, MemoryStore};
use crate::types::{ChainEvent, EventKind, TxSummary};

// --- Helpers ---

type EventSink = Arc<Mutex<Vec<ChainEvent>>>;

fn tx(hash: &str, from: &str, to: &str) -> TxSummary {
    TxSummary {
        hash: hash.into(),
        from: from.into(),
        to: to.into(),
        fee: "0.0001".into(),
        amount: "2.0".into(),
    }
}

fn start_watcher(
    store: Arc<dyn CheckpointStore>,
    mock: Arc<MockChain>,
    confirm_times: i64,
    addresses: &[&str],
) -> (ChainWatcher, EventSink) {
    let mut watcher = ChainWatcher::new(store);
    watcher
        .register_chain(ChainConfig::new("mock", confirm_times), mock as Arc<dyn ChainAdapter>)
        .unwrap();
    let addrs: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
    watcher.watch_addresses("mock", &addrs).unwrap();

    let sink: EventSink = Arc::new(Mutex::new(Vec::new()));
    let sink2 = sink.clone();
    watcher
        .start(Arc::new(move |_chain: &str, event: ChainEvent| {
            sink2.lock().unwrap().push(event);
        }))
        .unwrap();
    (watcher, sink)
}

async fn wait_for(sink: &EventSink, n: usize) {
    for _ in 0..400 {
        if sink.lock().unwrap().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "timed out waiting for {n} events, got {:?}",
        sink.lock().unwrap().iter().map(|e| (e.kind, e.id)).collect::<Vec<_>>()
    );
}

fn kinds_and_ids(sink: &EventSink) -> Vec<(EventKind, i64)> {
    sink.lock().unwrap().iter().map(|e| (e.kind, e.id)).collect()
}

// --- Tests ---

#[tokio::test]
async fn deposit_lifecycle_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(10, vec![tx("t1", "x", "A")]);

    let (mut watcher, sink) = start_watcher(store.clone(), mock.clone(), 3, &["A"]);

    mock.push_height(10).await;
    mock.push_height(11).await;
    mock.push_height(12).await;
    wait_for(&sink, 3).await;

    assert_eq!(
        kinds_and_ids(&sink),
        vec![
            (EventKind::Deposit, 1),
            (EventKind::DepositUpdate, 2),
            (EventKind::DepositConfirm, 3),
        ]
    );

    watcher.stop().await;
    // Progress was checkpointed after every height.
    let state = store.load("mock").unwrap();
    assert_eq!(state.checkpoint.unwrap().height, 12);
    assert_eq!(state.checkpoint.unwrap().next_event_id, 4);
    assert_eq!(state.addresses.get("A"), Some(&0));
}

#[tokio::test]
async fn withdraw_fails_when_unverifiable_at_confirm() {
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(10, vec![tx("t1", "A", "y")]);
    mock.mark_unverifiable("t1");

    let (mut watcher, sink) = start_watcher(store, mock.clone(), 3, &["A"]);

    for h in 10..=12 {
        mock.push_height(h).await;
    }
    wait_for(&sink, 3).await;

    assert_eq!(
        kinds_and_ids(&sink),
        vec![
            (EventKind::Withdraw, 1),
            (EventKind::WithdrawUpdate, 2),
            (EventKind::WithdrawFail, 3),
        ]
    );
    watcher.stop().await;
}

#[tokio::test]
async fn duplicate_height_notifications_are_noops() {
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(10, vec![tx("t1", "x", "A")]);

    let (mut watcher, sink) = start_watcher(store, mock.clone(), 3, &["A"]);

    mock.push_height(10).await;
    wait_for(&sink, 1).await;
    mock.push_height(10).await;
    mock.push_height(9).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // No duplicate initial event, no extra lifecycle step.
    assert_eq!(kinds_and_ids(&sink), vec![(EventKind::Deposit, 1)]);
    watcher.stop().await;
}

#[tokio::test]
async fn failed_block_fetch_is_retried_on_next_notification() {
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(10, vec![tx("t1", "x", "A")]);
    mock.fail_at(11);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors2 = errors.clone();

    let mut watcher = ChainWatcher::new(store);
    watcher.set_error_handler(Arc::new(move |err: &WatchError| {
        errors2.lock().unwrap().push(err.to_string());
    }));
    watcher
        .register_chain(ChainConfig::new("mock", 3), mock.clone() as Arc<dyn ChainAdapter>)
        .unwrap();
    watcher.watch_addresses("mock", &["A".to_string()]).unwrap();

    let sink: EventSink = Arc::new(Mutex::new(Vec::new()));
    let sink2 = sink.clone();
    watcher
        .start(Arc::new(move |_chain: &str, event: ChainEvent| {
            sink2.lock().unwrap().push(event)
        }))
        .unwrap();

    mock.push_height(10).await;
    wait_for(&sink, 1).await;

    // Height 11 fails: reported, height not advanced.
    mock.push_height(11).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(kinds_and_ids(&sink), vec![(EventKind::Deposit, 1)]);
    assert!(!errors.lock().unwrap().is_empty());

    // Next notification for the same height succeeds and the lifecycle
    // resumes where it left off.
    mock.clear_failure(11);
    mock.push_height(11).await;
    mock.push_height(12).await;
    wait_for(&sink, 3).await;
    assert_eq!(
        kinds_and_ids(&sink),
        vec![
            (EventKind::Deposit, 1),
            (EventKind::DepositUpdate, 2),
            (EventKind::DepositConfirm, 3),
        ]
    );
    watcher.stop().await;
}

#[tokio::test]
async fn restart_backfills_and_never_reissues_ids() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    // First run: observe the deposit at height 10, then go down.
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(10, vec![tx("t1", "x", "A")]);
    let (mut watcher, sink) = start_watcher(store.clone(), mock.clone(), 3, &["A"]);
    mock.push_height(10).await;
    wait_for(&sink, 1).await;
    watcher.stop().await;

    let persisted = store.load("mock").unwrap().checkpoint.unwrap();
    assert_eq!(persisted.height, 10);
    assert_eq!(persisted.next_event_id, 4);

    // Second run against the same store and the same historical blocks. The
    // pending entry was lost with the process; backfill replays it with a
    // deterministic synthesized lifecycle.
    let mock2 = Arc::new(MockChain::new("mock"));
    mock2.put_block(10, vec![tx("t1", "x", "A")]);
    let (mut watcher2, sink2) = start_watcher(store.clone(), mock2.clone(), 3, &["A"]);
    mock2.push_height(11).await;
    wait_for(&sink2, 3).await;

    let events = kinds_and_ids(&sink2);
    assert_eq!(
        events,
        vec![
            (EventKind::Deposit, 4),
            (EventKind::DepositUpdate, 5),
            (EventKind::DepositConfirm, 6),
        ]
    );
    // Restart safety: nothing below the persisted next id is ever reissued.
    assert!(events.iter().all(|(_, id)| *id >= persisted.next_event_id));
    watcher2.stop().await;
}

#[tokio::test]
async fn addresses_survive_restart() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    let mock = Arc::new(MockChain::new("mock"));
    let (mut watcher, _sink) = start_watcher(store.clone(), mock.clone(), 3, &["A", "B"]);
    watcher.stop().await;

    // A new watcher over the same store already knows both addresses:
    // re-registering reports the original heights instead of re-adding.
    let mock2 = Arc::new(MockChain::new("mock"));
    let mut watcher2 = ChainWatcher::new(store);
    watcher2
        .register_chain(ChainConfig::new("mock", 3), mock2 as Arc<dyn ChainAdapter>)
        .unwrap();
    let heights = watcher2.watch_addresses("mock", &["A".to_string()]).unwrap();
    assert_eq!(heights.get("A"), Some(&0));
}

#[tokio::test]
async fn reset_clears_persisted_state() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(10, vec![tx("t1", "x", "A")]);

    let (mut watcher, sink) = start_watcher(store.clone(), mock.clone(), 3, &["A"]);
    mock.push_height(10).await;
    wait_for(&sink, 1).await;

    watcher.reset("mock").await.unwrap();

    let state = store.load("mock").unwrap();
    assert!(state.checkpoint.is_none());
    assert!(state.addresses.is_empty());
    assert_eq!(store.load_block("mock", 10).unwrap(), None);
    // The chain is gone from the watcher too.
    assert!(matches!(
        watcher.watch_addresses("mock", &["A".to_string()]),
        Err(WatchError::UnknownChain(_))
    ));
}

#[tokio::test]
async fn registration_guards() {
    let store = Arc::new(MemoryStore::new());
    let mut watcher = ChainWatcher::new(store);

    // confirm_times below 2 is invalid configuration.
    let mock = Arc::new(MockChain::new("mock"));
    assert!(matches!(
        watcher.register_chain(ChainConfig::new("mock", 1), mock.clone() as Arc<dyn ChainAdapter>),
        Err(WatchError::InvalidConfirmTimes(1))
    ));

    // Config name must match the adapter identity.
    assert!(matches!(
        watcher.register_chain(ChainConfig::new("other", 3), mock.clone() as Arc<dyn ChainAdapter>),
        Err(WatchError::ChainMismatch { .. })
    ));

    watcher
        .register_chain(ChainConfig::new("mock", 3), mock.clone() as Arc<dyn ChainAdapter>)
        .unwrap();
    assert!(matches!(
        watcher.register_chain(ChainConfig::new("mock", 3), mock as Arc<dyn ChainAdapter>),
        Err(WatchError::DuplicateChain(_))
    ));
}

#[tokio::test]
async fn idle_stop_leaves_no_checkpoint_and_no_replay() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    // First run never sees a height notification.
    let mock = Arc::new(MockChain::new("mock"));
    let (mut watcher, _sink) = start_watcher(store.clone(), mock, 3, &["A"]);
    watcher.stop().await;

    // No progress was made, so none is recorded; a zero-height checkpoint
    // here would turn the whole chain history into a catch-up window.
    assert!(store.load("mock").unwrap().checkpoint.is_none());

    // Second run over the same store, with an old settled transaction deep
    // in history and the head far ahead. Nothing is replayed.
    let mock2 = Arc::new(MockChain::new("mock"));
    mock2.put_block(3, vec![tx("t1", "x", "A")]);
    let (mut watcher2, sink2) = start_watcher(store.clone(), mock2.clone(), 3, &["A"]);
    mock2.push_height(500).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(kinds_and_ids(&sink2).is_empty());
    watcher2.stop().await;
    assert_eq!(store.load("mock").unwrap().checkpoint.unwrap().height, 500);
}

#[tokio::test]
async fn matched_transactions_are_archived_per_block() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(10, vec![tx("t1", "x", "A"), tx("t2", "u", "v")]);
    mock.put_block(11, vec![tx("t3", "u", "v")]);

    let (mut watcher, sink) = start_watcher(store.clone(), mock.clone(), 3, &["A"]);
    mock.push_height(10).await;
    mock.push_height(11).await;
    wait_for(&sink, 2).await;
    watcher.stop().await;

    // The archive holds only the transactions that touched a watched
    // address; blocks with no match leave no record.
    assert_eq!(store.load_block("mock", 10).unwrap(), Some(vec![tx("t1", "x", "A")]));
    assert_eq!(store.load_block("mock", 11).unwrap(), None);
}

#[tokio::test]
async fn self_transfer_surfaces_once_and_is_not_tracked() {
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(10, vec![tx("t1", "A", "A")]);

    let (mut watcher, sink) = start_watcher(store, mock.clone(), 3, &["A"]);

    mock.push_height(10).await;
    mock.push_height(11).await;
    mock.push_height(12).await;
    wait_for(&sink, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // One anomaly event, then silence: nothing was enqueued.
    assert_eq!(kinds_and_ids(&sink), vec![(EventKind::SelfTransferError, 1)]);
    watcher.stop().await;
}
