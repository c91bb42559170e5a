use std::collections::HashSet;

use parking_lot::Mutex;

/// Company keys already claimed by some worker during one pass.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    claimed: Mutex<HashSet<String>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` was not claimed yet, and claims it.
    pub fn claim(&self, key: &str) -> bool {
        let mut claimed = self.claimed.lock();
        if claimed.contains(key) {
            return false;
        }
        claimed.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.claimed.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.lock().is_empty()
    }

    /// Sorted copy of the claimed keys
    pub fn claimed(&self) -> Vec<String> {
        let mut keys = self.claimed.lock().iter().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }
}
