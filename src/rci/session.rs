//! Explicit per-session state and the table-driven phase machine.
//!
//! ```text
//! ┌────────┬──────────────────────────────────────────────────────────┐
//! │ Phase   │ accepted transitions → next phase                        │
//! ├────────┼──────────────────────────────────────────────────────────┤
//! │ Idle    │ session-start → Session                                  │
//! │ Session │ action-start → Action, group-start → Group,              │
//! │         │ group-end (closed by action-end) → Session,              │
//! │         │ session-end → Closed                                     │
//! │ Action  │ group-start → Group, action-end → Session                │
//! │ Group   │ group-process, list-start, list-end → Group,             │
//! │         │ group-end → Action, action-end → Session                 │
//! │ Closed  │ session-start → Session                                  │
//! └────────┴──────────────────────────────────────────────────────────┘
//!   session-cancel is accepted from every phase and leads to Closed.
//! ```
//!
//! The phase only advances once a transition completes; a `busy` step keeps
//! the phase and records what is pending.

use core::fmt;

use crate::rci::list::ListStack;
use crate::rci::request::{Action, GroupRef, QuerySource, Request, RequestKind};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Phase identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Session = 1,
    Action = 2,
    Group = 3,
    Closed = 4,
}

impl Phase {
    pub const COUNT: usize = 5;

    /// Panics on out-of-range in debug builds; returns `Closed` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Session,
            2 => Self::Action,
            3 => Self::Group,
            4 => Self::Closed,
            _ => {
                debug_assert!(false, "invalid phase index: {idx}");
                Self::Closed
            }
        }
    }

    pub fn name(self) -> &'static str {
        PHASE_TABLE[self as usize].name
    }
}

// ---------------------------------------------------------------------------
// Phase table
// ---------------------------------------------------------------------------

/// Returns the phase a transition leads to, or `None` if it is out of sequence.
pub type TransitionFn = fn(&Session, RequestKind) -> Option<Phase>;

pub struct PhaseDescriptor {
    pub phase: Phase,
    pub name: &'static str,
    pub next: TransitionFn,
}

static PHASE_TABLE: [PhaseDescriptor; Phase::COUNT] = [
    PhaseDescriptor {
        phase: Phase::Idle,
        name: "IDLE",
        next: idle_next,
    },
    PhaseDescriptor {
        phase: Phase::Session,
        name: "SESSION",
        next: session_next,
    },
    PhaseDescriptor {
        phase: Phase::Action,
        name: "ACTION",
        next: action_next,
    },
    PhaseDescriptor {
        phase: Phase::Group,
        name: "GROUP",
        next: group_next,
    },
    PhaseDescriptor {
        phase: Phase::Closed,
        name: "CLOSED",
        next: idle_next,
    },
];

fn idle_next(_: &Session, kind: RequestKind) -> Option<Phase> {
    match kind {
        RequestKind::SessionStart => Some(Phase::Session),
        RequestKind::SessionCancel => Some(Phase::Closed),
        _ => None,
    }
}

fn session_next(s: &Session, kind: RequestKind) -> Option<Phase> {
    match kind {
        RequestKind::ActionStart => Some(Phase::Action),
        // Implicit action, possibly still undetermined.
        RequestKind::GroupStart => Some(Phase::Group),
        RequestKind::GroupEnd if s.closed_group.is_some() => Some(Phase::Session),
        RequestKind::SessionEnd | RequestKind::SessionCancel => Some(Phase::Closed),
        _ => None,
    }
}

fn action_next(_: &Session, kind: RequestKind) -> Option<Phase> {
    match kind {
        RequestKind::GroupStart => Some(Phase::Group),
        RequestKind::ActionEnd => Some(Phase::Session),
        RequestKind::SessionCancel => Some(Phase::Closed),
        _ => None,
    }
}

fn group_next(_: &Session, kind: RequestKind) -> Option<Phase> {
    match kind {
        RequestKind::GroupProcess | RequestKind::ListStart | RequestKind::ListEnd => {
            Some(Phase::Group)
        }
        RequestKind::GroupEnd => Some(Phase::Action),
        RequestKind::ActionEnd => Some(Phase::Session),
        RequestKind::SessionCancel => Some(Phase::Closed),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Pending transitions
// ---------------------------------------------------------------------------

/// Where a busy transition resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Re-dispatch to the handler or application.
    Dispatch,
    /// Retry lock acquisition on an already pushed and resolved level.
    Lock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub kind: RequestKind,
    pub stage: Stage,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// State of one remote-configuration session. Created by
/// [`Engine::open_session`](crate::rci::engine::Engine::open_session) and
/// passed to every step.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    pub(crate) phase: Phase,
    /// `None` while an implicit action has not been fixed yet.
    pub(crate) action: Option<Action>,
    pub(crate) source: QuerySource,
    pub(crate) group: Option<GroupRef>,
    /// Group implicitly closed by action-end, awaiting its trailing group-end.
    pub(crate) closed_group: Option<GroupRef>,
    pub(crate) group_skip: bool,
    pub(crate) list: ListStack,
    pub(crate) pending: Option<Pending>,
}

impl Session {
    pub(crate) fn new(id: SessionId) -> Self {
        Self {
            id,
            phase: Phase::Idle,
            action: None,
            source: QuerySource::Current,
            group: None,
            closed_group: None,
            group_skip: false,
            list: ListStack::new(),
            pending: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn action(&self) -> Option<Action> {
        self.action
    }

    pub fn active_group(&self) -> Option<GroupRef> {
        self.group
    }

    pub fn list(&self) -> &ListStack {
        &self.list
    }

    pub fn pending(&self) -> Option<Pending> {
        self.pending
    }

    pub fn is_group_skipped(&self) -> bool {
        self.group_skip
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Phase `request` leads to from the current phase.
    pub fn next_phase(&self, request: &Request) -> Option<Phase> {
        (PHASE_TABLE[self.phase as usize].next)(self, request.kind)
    }

    /// Stage to resume at if `kind` is the transition left pending.
    pub(crate) fn resume_stage(&self, kind: RequestKind) -> Option<Stage> {
        self.pending.filter(|p| p.kind == kind).map(|p| p.stage)
    }

    /// Reset to the post-teardown state. The caller releases locks first.
    pub(crate) fn close(&mut self) {
        self.phase = Phase::Closed;
        self.group = None;
        self.closed_group = None;
        self.group_skip = false;
        self.list.clear();
        self.pending = None;
    }
}
