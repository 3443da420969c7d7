//! Remote-configuration (RCI) subsystem.
//!
//! ```text
//!   Request ──▶ Session ──▶ List stack ──▶ Router ──┬──▶ built-in handler ──▶ StoragePort
//!               (phase)     + resolver               └──▶ AppCallback
//!                               │
//!                               ▼
//!                          Lock manager
//! ```

pub mod engine;
pub mod list;
pub mod lock;
pub mod request;
pub mod router;
pub mod session;

pub use engine::Engine;
pub use request::{Action, CallbackStatus, ElementValue, Request, RequestKind, Response};
pub use session::Session;
