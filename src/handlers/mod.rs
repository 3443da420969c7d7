//! Built-in group handlers.
//!
//! Each handler owns a configuration record wrapped in [`Staged`]: the
//! committed copy every session reads, plus one staged copy per session
//! running a set action. Sessions never wait on each other's staging. A
//! commit merges only the slots its session touched into the committed
//! record and persists the result with one `postcard` blob write.

pub mod device_health;
pub mod enhanced_services;

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::ports::{StorageError, StoragePort};
use crate::rci::request::QuerySource;
use crate::rci::session::SessionId;

pub use device_health::DeviceHealthHandler;
pub use enhanced_services::EnhancedServicesHandler;

/// Largest persisted handler record.
pub const MAX_RECORD_SIZE: usize = 1024;

/// A record made of independently mergeable slots.
///
/// Two sessions touching different slots both keep their changes; on the
/// same slot the later commit wins.
pub trait Slotted: Clone {
    /// Number of slots, at most 32.
    const SLOTS: usize;

    /// Overwrite slot `slot` of `self` with the one in `from`.
    fn copy_slot(&mut self, from: &Self, slot: usize);
}

#[derive(Debug, Clone)]
struct StagedCopy<R> {
    owner: SessionId,
    record: R,
    /// Bit per slot written by `owner`.
    touched: u32,
}

/// Committed record plus each session's uncommitted copy.
#[derive(Debug, Clone)]
pub struct Staged<R> {
    committed: R,
    staged: Vec<StagedCopy<R>>,
}

impl<R: Slotted + Default> Default for Staged<R> {
    fn default() -> Self {
        Self::new(R::default())
    }
}

impl<R: Slotted> Staged<R> {
    pub fn new(committed: R) -> Self {
        Self {
            committed,
            staged: Vec::new(),
        }
    }

    pub fn committed(&self) -> &R {
        &self.committed
    }

    fn position(&self, owner: SessionId) -> Option<usize> {
        self.staged.iter().position(|c| c.owner == owner)
    }

    /// What `owner` sees: its own staged copy, else the committed record.
    pub fn view(&self, owner: SessionId) -> &R {
        match self.position(owner) {
            Some(i) => &self.staged[i].record,
            None => &self.committed,
        }
    }

    /// Mutable staged copy for `owner` with `slot` marked as written. The
    /// copy is taken from the committed record on first use.
    pub fn stage(&mut self, owner: SessionId, slot: usize) -> &mut R {
        debug_assert!(slot < R::SLOTS);
        let i = match self.position(owner) {
            Some(i) => i,
            None => {
                self.staged.push(StagedCopy {
                    owner,
                    record: self.committed.clone(),
                    touched: 0,
                });
                self.staged.len() - 1
            }
        };
        let copy = &mut self.staged[i];
        copy.touched |= 1u32.checked_shl(slot as u32).unwrap_or(0);
        &mut copy.record
    }

    pub fn is_staged_by(&self, owner: SessionId) -> bool {
        self.position(owner).is_some()
    }

    /// Sessions currently holding a staged copy.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn rollback(&mut self, owner: SessionId) {
        if let Some(i) = self.position(owner) {
            debug!("RCI[{}]: staged record discarded", owner);
            self.staged.swap_remove(i);
        }
    }

    /// Merge `owner`'s touched slots into the committed record and persist
    /// the result through `save`. On success the merge becomes committed and
    /// other sessions' copies pick up the slots they have not written
    /// themselves. On failure the committed record is untouched and the
    /// staged copy is dropped.
    pub fn commit_with<F>(&mut self, owner: SessionId, save: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&R) -> Result<(), StorageError>,
    {
        let Some(i) = self.position(owner) else {
            return Ok(false);
        };
        let copy = self.staged.swap_remove(i);
        let mut merged = self.committed.clone();
        for slot in slots(copy.touched) {
            merged.copy_slot(&copy.record, slot);
        }
        save(&merged)?;
        self.committed = merged;

        for other in self.staged.iter_mut() {
            let overlap = other.touched & copy.touched;
            if overlap != 0 {
                warn!(
                    "RCI[{}]: slots {:#x} also staged by session {}; its commit will override",
                    owner, overlap, other.owner
                );
            }
            for slot in slots(copy.touched & !other.touched) {
                other.record.copy_slot(&self.committed, slot);
            }
        }
        Ok(true)
    }

    /// Replace the committed record, e.g. after loading from storage.
    pub fn restore(&mut self, record: R) {
        self.committed = record;
    }
}

fn slots(mask: u32) -> impl Iterator<Item = usize> {
    (0..32).filter(move |b| mask & (1 << b) != 0)
}

/// Serialize `record` and write it as one blob.
pub fn save_record<R: Serialize>(
    storage: &mut dyn StoragePort,
    namespace: &str,
    key: &str,
    record: &R,
) -> Result<(), StorageError> {
    let bytes = postcard::to_allocvec(record).map_err(|_| StorageError::Corrupted)?;
    if bytes.len() > MAX_RECORD_SIZE {
        return Err(StorageError::Full);
    }
    storage.write(namespace, key, &bytes)
}

/// Read and decode a record. `Ok(None)` when nothing is stored yet.
pub fn read_record<R: DeserializeOwned>(
    storage: &dyn StoragePort,
    namespace: &str,
    key: &str,
) -> Result<Option<R>, StorageError> {
    let mut buf = [0u8; MAX_RECORD_SIZE];
    match storage.read(namespace, key, &mut buf) {
        Ok(len) => postcard::from_bytes(&buf[..len])
            .map(Some)
            .map_err(|_| StorageError::Corrupted),
        Err(StorageError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Record a query should read, given the session and requested source.
pub fn select_record<R: Slotted + Default + DeserializeOwned>(
    staged: &Staged<R>,
    owner: SessionId,
    source: QuerySource,
    storage: &dyn StoragePort,
    namespace: &str,
    key: &str,
) -> Result<R, StorageError> {
    match source {
        QuerySource::Current => Ok(staged.view(owner).clone()),
        QuerySource::Stored => {
            Ok(read_record(storage, namespace, key)?.unwrap_or_else(|| staged.committed().clone()))
        }
        QuerySource::Defaults => Ok(R::default()),
    }
}
