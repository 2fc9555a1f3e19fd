//! Rendezvous store interface. A process group only holds on to its store;
//! rank discovery through it happens outside this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CclError, Result};

/// Key-value store shared by the ranks of a job.
pub trait Store: Send + Sync {
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Atomically add `delta` to an integer counter, returning the new value.
    fn add(&self, key: &str, delta: i64) -> Result<i64>;
}

/// In-memory store for single-process jobs and tests.
#[derive(Debug, Default)]
pub struct HashStore {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl HashStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.map
            .lock()
            .map_err(|_| CclError::LockPoisoned("hash store"))
    }
}

impl Store for HashStore {
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.map()?.insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.map()?.get(key).cloned())
    }

    fn add(&self, key: &str, delta: i64) -> Result<i64> {
        let mut map = self.map()?;
        let current = match map.get(key) {
            None => 0,
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    CclError::invalid("store add", format!("key {key:?} does not hold a counter"))
                })?;
                i64::from_le_bytes(raw)
            }
        };
        let next = current + delta;
        map.insert(key.to_string(), next.to_le_bytes().to_vec());
        Ok(next)
    }
}
