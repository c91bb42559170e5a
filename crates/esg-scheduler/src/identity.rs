use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

/// A browser fingerprint, held by at most one worker at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("identity pool exhausted")]
    Exhausted,
}

/// Identities are handed out in insertion order and never returned.
#[derive(Debug, Default)]
pub struct IdentityPool {
    available: Mutex<VecDeque<Identity>>,
}

impl IdentityPool {
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: Mutex::new(identities.into_iter().map(Identity::new).collect()),
        }
    }

    pub fn checkout(&self) -> Result<Identity, PoolError> {
        self.available.lock().pop_front().ok_or(PoolError::Exhausted)
    }

    pub fn size(&self) -> usize {
        self.available.lock().len()
    }

    /// Moves every identity past the first `at` into a new pool.
    pub fn split_off(&self, at: usize) -> IdentityPool {
        let mut available = self.available.lock();
        let rest = if at < available.len() {
            available.split_off(at)
        } else {
            VecDeque::new()
        };
        Self {
            available: Mutex::new(rest),
        }
    }
}
