use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{CclError, Result};

/// A reference-counted byte allocation shared by every tensor view onto it.
///
/// Two tensors alias each other exactly when they hold the same `Arc<Storage>`.
#[derive(Debug)]
pub struct Storage {
    bytes: RwLock<Vec<u8>>,
}

impl Storage {
    /// Allocate `len_bytes` zeroed bytes.
    pub fn zeroed(len_bytes: usize) -> Self {
        Self {
            bytes: RwLock::new(vec![0u8; len_bytes]),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    pub fn len_bytes(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, Vec<u8>>> {
        self.bytes
            .read()
            .map_err(|_| CclError::LockPoisoned("tensor storage"))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<u8>>> {
        self.bytes
            .write()
            .map_err(|_| CclError::LockPoisoned("tensor storage"))
    }
}
