//! Lock manager — exclusive mutation rights over dynamic collection instances.
//!
//! A lock is keyed by the group instance plus the full path of resolved
//! `(collection, instance)` pairs, so two instances of the same variable
//! collection lock independently. The manager is shared by every session the
//! engine drives; contention is reported as [`LockDenied`], which the engine
//! turns into a `busy` status.

use core::fmt;
use core::num::NonZeroU32;

use log::debug;

use crate::rci::list::{LevelPath, ListLevel};
use crate::rci::session::SessionId;
use crate::schema::GroupKey;

/// Upper bound on simultaneously held locks.
pub const MAX_LOCKS: usize = 16;

/// Opaque, never-zero lock token. Absence means "unlocked".
pub type LockToken = NonZeroU32;

/// Identity of one lockable collection instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockKey {
    pub group: GroupKey,
    pub index: u16,
    pub path: LevelPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDenied {
    /// The level already carries a token.
    LevelHoldsLock,
    /// Another holder owns this instance.
    HeldElsewhere,
    /// The lock table is at capacity.
    TableFull,
}

impl fmt::Display for LockDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LevelHoldsLock => write!(f, "level already locked"),
            Self::HeldElsewhere => write!(f, "instance locked by another session"),
            Self::TableFull => write!(f, "lock table full"),
        }
    }
}

#[derive(Debug)]
struct Entry {
    key: LockKey,
    token: LockToken,
    owner: SessionId,
}

#[derive(Debug)]
pub struct LockManager {
    entries: heapless::Vec<Entry, MAX_LOCKS>,
    limit: usize,
    next_token: u32,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(MAX_LOCKS)
    }
}

impl LockManager {
    /// `limit` is clamped to [`MAX_LOCKS`].
    pub fn new(limit: usize) -> Self {
        Self {
            entries: heapless::Vec::new(),
            limit: limit.min(MAX_LOCKS),
            next_token: 1,
        }
    }

    /// Grant `owner` exclusive rights over `key` and store the token on `level`.
    pub fn acquire(
        &mut self,
        level: &mut ListLevel,
        key: LockKey,
        owner: SessionId,
    ) -> Result<LockToken, LockDenied> {
        if level.lock.is_some() {
            return Err(LockDenied::LevelHoldsLock);
        }
        if self.is_locked(&key) {
            return Err(LockDenied::HeldElsewhere);
        }
        if self.entries.len() >= self.limit {
            return Err(LockDenied::TableFull);
        }

        let token = self.fresh_token();
        self.entries
            .push(Entry { key, token, owner })
            .map_err(|_| LockDenied::TableFull)?;
        level.lock = Some(token);
        debug!("RCI[{}]: lock {} acquired", owner, token);
        Ok(token)
    }

    /// Clear the level's token. Safe to call on an unlocked level.
    pub fn release(&mut self, level: &mut ListLevel) {
        if let Some(token) = level.lock.take() {
            self.entries.retain(|e| e.token != token);
        }
    }

    /// Drop every lock `owner` holds. Returns how many were released.
    pub fn release_all(&mut self, owner: SessionId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.owner != owner);
        before - self.entries.len()
    }

    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.entries.iter().any(|e| e.key == *key)
    }

    /// Number of locks currently held across all sessions.
    pub fn held(&self) -> usize {
        self.entries.len()
    }

    pub fn held_by(&self, owner: SessionId) -> usize {
        self.entries.iter().filter(|e| e.owner == owner).count()
    }

    fn fresh_token(&mut self) -> LockToken {
        loop {
            let raw = self.next_token;
            self.next_token = self.next_token.wrapping_add(1);
            if let Some(token) = NonZeroU32::new(raw) {
                if !self.entries.iter().any(|e| e.token == token) {
                    return token;
                }
            }
        }
    }
}
