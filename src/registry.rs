use std::collections::HashMap;
use std::sync::Mutex;

/// Watched-address set for one chain.
///
/// Registration is driven by an external caller context while the chain loop
/// reads membership, so the map sits behind a mutex. The loop takes a whole
/// snapshot per block rather than locking per transaction.
///
/// Addresses are never removed; re-registering an address is a no-op that
/// reports the original registration height.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    inner: Mutex<HashMap<String, i64>>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from persisted state at startup.
    pub fn seed(addresses: HashMap<String, i64>) -> Self {
        Self {
            inner: Mutex::new(addresses),
        }
    }

    /// Register addresses at `height`, reporting each address's effective
    /// registration height (the original one for already-known addresses).
    pub fn register(&self, addresses: &[String], height: i64) -> HashMap<String, i64> {
        let mut map = self.inner.lock().unwrap();
        let mut out = HashMap::with_capacity(addresses.len());
        for addr in addresses {
            let at = *map.entry(addr.clone()).or_insert(height);
            out.insert(addr.clone(), at);
        }
        out
    }

    /// Clone of the full map, for lock-free classification of a block.
    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.inner.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
