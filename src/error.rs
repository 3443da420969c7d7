//! Unified error types for the RCI engine.
//!
//! Two classes are kept strictly apart:
//!
//! - [`InvariantViolation`]: the compiled schema, the built-in handlers and the
//!   session layer disagree with each other. These are programmer/schema bugs
//!   and are routed through a single reporting boundary in the engine, which
//!   either panics or logs and ignores depending on
//!   [`InvariantPolicy`](crate::config::InvariantPolicy).
//! - [`RequestError`]: the remote request itself cannot be honoured. These
//!   become an ordinary `error` status plus an error hint.
//!
//! All variants are `Copy` so they can be returned through the step loop
//! without allocation.

use core::fmt;

use crate::app::ports::StorageError;
use crate::rci::router::RouteError;
use crate::schema::{CollectionId, ElementId, GroupId};

// ---------------------------------------------------------------------------
// Top-level engine error
// ---------------------------------------------------------------------------

/// Every fallible engine operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Schema, handler and caller have drifted apart.
    Invariant(InvariantViolation),
    /// The remote request is not acceptable.
    Request(RequestError),
    /// The storage medium failed while persisting a record.
    Storage(StorageError),
}

impl Error {
    /// Static hint suitable for the response's error-hint slot.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Invariant(_) => "internal error",
            Self::Request(e) => e.hint(),
            Self::Storage(_) => "storage failure",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invariant(e) => write!(f, "invariant: {e}"),
            Self::Request(e) => write!(f, "request: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema-contract violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Element id is not below the element count of the resolved group.
    ElementOutOfRange {
        group: GroupId,
        element: ElementId,
        count: usize,
    },
    /// A list level was pushed beyond the group's declared nesting depth.
    DepthExceeded { max: usize },
    /// A list operation needed a level but the stack is empty.
    NoActiveLevel,
    /// A level's instance was read, or a child pushed, before it was resolved.
    UnresolvedInstance { collection: CollectionId },
    /// A built-in handler does not know an element its group descriptor declares.
    HandlerDrift { group: GroupId, element: ElementId },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementOutOfRange {
                group,
                element,
                count,
            } => write!(
                f,
                "element {element} out of range for group {group} ({count} elements)"
            ),
            Self::DepthExceeded { max } => write!(f, "list depth exceeds maximum {max}"),
            Self::NoActiveLevel => write!(f, "no active list level"),
            Self::UnresolvedInstance { collection } => {
                write!(f, "collection {collection} has no resolved instance")
            }
            Self::HandlerDrift { group, element } => {
                write!(f, "handler for group {group} has no element {element}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<InvariantViolation> for Error {
    fn from(e: InvariantViolation) -> Self {
        Self::Invariant(e)
    }
}

// ---------------------------------------------------------------------------
// Remote request errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// Group or collection instance index outside the allowed range.
    InvalidIndex,
    /// Group id is not present in the schema catalog.
    UnknownGroup,
    /// Collection id is not present below the current level.
    UnknownCollection,
    /// Set requested on a read-only element.
    ReadOnly,
    /// Value variant does not match the element type, or is missing.
    TypeMismatch,
    /// Value outside the element's declared limit.
    OutOfRange,
    /// Transition not allowed in the session's current phase.
    OutOfSequence,
}

impl RequestError {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InvalidIndex => "invalid index",
            Self::UnknownGroup => "unknown group",
            Self::UnknownCollection => "unknown collection",
            Self::ReadOnly => "read only",
            Self::TypeMismatch => "type mismatch",
            Self::OutOfRange => "value out of range",
            Self::OutOfSequence => "out of sequence",
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hint())
    }
}

impl From<RequestError> for Error {
    fn from(e: RequestError) -> Self {
        Self::Request(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Engine construction
// ---------------------------------------------------------------------------

/// Reasons an [`Engine`](crate::rci::engine::Engine) cannot be assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    Config(&'static str),
    Schema(&'static str),
    Route(RouteError),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Schema(msg) => write!(f, "schema: {msg}"),
            Self::Route(e) => write!(f, "router: {e}"),
        }
    }
}

impl From<RouteError> for SetupError {
    fn from(e: RouteError) -> Self {
        Self::Route(e)
    }
}

impl std::error::Error for SetupError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Engine-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
