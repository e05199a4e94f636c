use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use chainwatch::adapter::{ChainAdapter, MockChain};
use chainwatch::{ChainConfig, ChainWatcher, MemoryStore, TxSummary};

/// Demo run: a scripted mock chain producing one deposit, one withdrawal and
/// one self-transfer anomaly, tracked through their confirmation lifecycles.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Blocks required before finality (inclusive of the observation block).
    #[arg(long, default_value_t = 3)]
    confirm_times: i64,

    /// Checkpoint database path; in-memory when omitted.
    #[arg(long)]
    db_path: Option<String>,

    /// Milliseconds between mock blocks.
    #[arg(long, default_value_t = 500)]
    block_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut watcher = match &args.db_path {
        Some(path) => ChainWatcher::open(path)?,
        None => ChainWatcher::new(Arc::new(MemoryStore::new())),
    };
    let mock = Arc::new(MockChain::new("mock"));
    mock.put_block(
        10,
        vec![
            tx("0xdeposit", "0xsomeone", "0xalice"),
            tx("0xwithdraw", "0xbob", "0xelsewhere"),
            tx("0xself", "0xalice", "0xalice"),
        ],
    );

    watcher.register_chain(
        ChainConfig::new("mock", args.confirm_times),
        mock.clone() as Arc<dyn ChainAdapter>,
    )?;
    let heights = watcher.watch_addresses("mock", &["0xalice".to_string(), "0xbob".to_string()])?;
    println!("[MAIN] watching {} addresses: {:?}", heights.len(), heights);

    watcher.start(Arc::new(|chain: &str, event: chainwatch::ChainEvent| {
        println!(
            "[EVENT] {} {:?} id={} tx={} amount={}",
            chain, event.kind, event.id, event.tx.hash, event.tx.amount
        );
    }))?;

    // Walk the mock head far enough for every lifecycle to terminate.
    for height in 10..10 + args.confirm_times {
        mock.push_height(height).await;
        tokio::time::sleep(Duration::from_millis(args.block_interval_ms)).await;
    }

    watcher.stop().await;
    println!("[MAIN] done");
    Ok(())
}

fn tx(hash: &str, from: &str, to: &str) -> TxSummary {
    TxSummary {
        hash: hash.into(),
        from: from.into(),
        to: to.into(),
        fee: "0.0002".into(),
        amount: "1.25".into(),
    }
}
