//! Port traits — the boundary between the RCI engine and the outside world.
//!
//! ```text
//!   session layer ──▶ Engine ──▶ AppCallback   (application-owned groups)
//!                        │
//!                        └──▶ StoragePort     (built-in handler records)
//! ```
//!
//! Adapters implement these traits. The [`Engine`](crate::rci::engine::Engine)
//! takes them as parameters on every step, so the engine never owns the
//! application or the storage medium and is fully testable with mocks.

use core::fmt;

use crate::rci::request::{CallbackStatus, Request, Response};

// ───────────────────────────────────────────────────────────────
// Application callback (driven adapter: engine → application)
// ───────────────────────────────────────────────────────────────

/// Generic remote-configuration callback supplied by the application.
///
/// Receives every transition the built-in handlers do not own, with the
/// request exactly as the session layer issued it. Returning
/// [`CallbackStatus::Busy`] asks the step loop to re-issue the same
/// transition later.
pub trait AppCallback {
    fn remote_config(&mut self, request: &Request, response: &mut Response) -> CallbackStatus;
}

impl<F> AppCallback for F
where
    F: FnMut(&Request, &mut Response) -> CallbackStatus,
{
    fn remote_config(&mut self, request: &Request, response: &mut Response) -> CallbackStatus {
        self(request, response)
    }
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: engine ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage used by built-in handlers to save their
/// configuration records.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: after a failed `write` the previous
///   value is still readable, never a partial blob.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored blob failed deserialization.
    Corrupted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored record corrupted"),
        }
    }
}
