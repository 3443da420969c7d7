//! Dispatch router — ordered table from group key to built-in handler.
//!
//! A miss means "forward to the application callback". Adding a built-in
//! group is a single [`Router::register`] call.

use core::fmt;

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::error::Result;
use crate::rci::request::{CallbackStatus, ElementValue, QuerySource, Response};
use crate::rci::session::SessionId;
use crate::schema::{ElementId, Group, GroupKey};

/// Upper bound on registered built-in handlers.
pub const MAX_HANDLERS: usize = 8;

/// Per-request view handed to a built-in handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub session: SessionId,
    /// 1-based group instance.
    pub index: u16,
    pub source: QuerySource,
    /// Storage namespace built-in handlers persist under.
    pub namespace: &'a str,
}

/// Compiled-in owner of one group.
///
/// Handlers keep a committed record plus a staged copy per session setting
/// it; `set` never waits on another session. Element ids reaching `set`/`query`
/// are already bounded by the group descriptor; an id the handler does not
/// know is reported as
/// [`InvariantViolation::HandlerDrift`](crate::error::InvariantViolation::HandlerDrift).
pub trait GroupHandler {
    fn key(&self) -> GroupKey;

    /// Schema descriptor published into the catalog on registration.
    fn descriptor(&self) -> Group;

    /// Restore the committed record from storage. Missing records keep defaults.
    fn load(&mut self, storage: &dyn StoragePort, namespace: &str) -> core::result::Result<(), StorageError>;

    fn group_start(&mut self, _ctx: &HandlerContext<'_>, _response: &mut Response) -> Result<CallbackStatus> {
        Ok(CallbackStatus::Continue)
    }

    fn group_end(&mut self, _ctx: &HandlerContext<'_>, _response: &mut Response) -> Result<CallbackStatus> {
        Ok(CallbackStatus::Continue)
    }

    /// Write `value` into the session's staged record.
    fn set(&mut self, ctx: &HandlerContext<'_>, element: ElementId, value: &ElementValue) -> Result<CallbackStatus>;

    /// Read `element` from the record selected by `ctx.source`.
    fn query(
        &mut self,
        ctx: &HandlerContext<'_>,
        element: ElementId,
        storage: &dyn StoragePort,
        response: &mut Response,
    ) -> Result<CallbackStatus>;

    /// Persist the staged record of `owner`, if any, in one storage write.
    /// Returns whether a write happened.
    fn commit(
        &mut self,
        owner: SessionId,
        storage: &mut dyn StoragePort,
        namespace: &str,
    ) -> core::result::Result<bool, StorageError>;

    /// Drop `owner`'s staged record without persisting it.
    fn rollback(&mut self, owner: SessionId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    Duplicate(GroupKey),
    TableFull,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(key) => write!(f, "group {:?}/{} already has a handler", key.kind, key.id),
            Self::TableFull => write!(f, "handler table full"),
        }
    }
}

#[derive(Default)]
pub struct Router {
    handlers: heapless::Vec<Box<dyn GroupHandler>, MAX_HANDLERS>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn GroupHandler>) -> core::result::Result<(), RouteError> {
        let key = handler.key();
        if self.owns(key) {
            return Err(RouteError::Duplicate(key));
        }
        self.handlers.push(handler).map_err(|_| RouteError::TableFull)?;
        info!("RCI: built-in handler registered for group {}", key.id);
        Ok(())
    }

    pub fn owns(&self, key: GroupKey) -> bool {
        self.handlers.iter().any(|h| h.key() == key)
    }

    /// Built-in handler for `key`, or `None` to forward to the application.
    pub fn route(&mut self, key: GroupKey) -> Option<&mut (dyn GroupHandler + 'static)> {
        self.handlers
            .iter_mut()
            .find(|h| h.key() == key)
            .map(|h| &mut **h)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Group descriptors of every registered handler.
    pub fn descriptors(&self) -> impl Iterator<Item = (GroupKey, Group)> + '_ {
        self.handlers.iter().map(|h| (h.key(), h.descriptor()))
    }

    /// Restore every handler's record. A corrupt or unreadable record keeps
    /// that handler on defaults.
    pub fn load_all(&mut self, storage: &dyn StoragePort, namespace: &str) {
        for h in self.handlers.iter_mut() {
            if let Err(e) = h.load(storage, namespace) {
                warn!("RCI: group {} record not restored: {}", h.key().id, e);
            }
        }
    }

    /// Commit every handler `owner` staged. Stops at the first storage failure.
    pub fn commit(
        &mut self,
        owner: SessionId,
        storage: &mut dyn StoragePort,
        namespace: &str,
    ) -> core::result::Result<usize, StorageError> {
        let mut written = 0;
        for h in self.handlers.iter_mut() {
            if h.commit(owner, storage, namespace)? {
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn rollback(&mut self, owner: SessionId) {
        for h in self.handlers.iter_mut() {
            h.rollback(owner);
        }
    }
}
