//! In-memory NVS (non-volatile storage) adapter.
//!
//! Implements [`StoragePort`] with a `namespace::key` map of blobs. Writes
//! replace the whole blob or fail without touching it, mirroring the
//! per-commit atomicity of a flash NVS partition. Used by the host binary
//! and by tests; fault injection lets tests exercise commit failures.

use std::collections::HashMap;

use log::{debug, warn};

use crate::app::ports::{StorageError, StoragePort};

#[derive(Debug, Default)]
pub struct NvsStore {
    store: HashMap<String, Vec<u8>>,
    /// Total bytes the partition may hold; `None` is unbounded.
    capacity: Option<usize>,
    fail_writes: Option<StorageError>,
    writes: usize,
}

impl NvsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the simulated partition to `bytes` of blob data.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            capacity: Some(bytes),
            ..Self::default()
        }
    }

    /// Make every subsequent write fail with `error` until cleared.
    pub fn fail_writes(&mut self, error: Option<StorageError>) {
        self.fail_writes = error;
    }

    /// Successful writes since creation.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    fn used_without(&self, composite: &str) -> usize {
        self.store
            .iter()
            .filter(|(k, _)| k.as_str() != composite)
            .map(|(_, v)| v.len())
            .sum()
    }
}

impl StoragePort for NvsStore {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let composite = Self::composite_key(namespace, key);
        match self.store.get(&composite) {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if let Some(e) = self.fail_writes {
            warn!("NvsStore: injected write failure for {}::{}", namespace, key);
            return Err(e);
        }
        let composite = Self::composite_key(namespace, key);
        if let Some(cap) = self.capacity {
            if self.used_without(&composite) + data.len() > cap {
                return Err(StorageError::Full);
            }
        }
        debug!("NvsStore: {} <- {} bytes", composite, data.len());
        self.store.insert(composite, data.to_vec());
        self.writes += 1;
        Ok(())
    }
}
