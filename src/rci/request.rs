//! Decoded request and response records exchanged on every transition.
//!
//! The session layer (outside this crate) decodes the wire protocol into a
//! [`Request`], hands it to the engine together with a [`Response`] slot,
//! and acts on the returned [`CallbackStatus`].

use serde::{Deserialize, Serialize};

use crate::schema::{CollectionId, ElementId, GroupKey, GroupType};

/// Maximum byte length of a string element value.
pub const MAX_STRING_LEN: usize = 128;
/// Maximum byte length of a dictionary key.
pub const MAX_KEY_LEN: usize = 32;

pub type ValueString = heapless::String<MAX_STRING_LEN>;
pub type KeyName = heapless::String<MAX_KEY_LEN>;

// ───────────────────────────────────────────────────────────────
// Transition identity
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    SessionStart,
    SessionEnd,
    SessionCancel,
    ActionStart,
    ActionEnd,
    GroupStart,
    GroupEnd,
    GroupProcess,
    ListStart,
    ListEnd,
}

impl RequestKind {
    /// Session-level transitions always belong to the application.
    pub fn is_session_level(self) -> bool {
        matches!(
            self,
            Self::SessionStart | Self::SessionEnd | Self::SessionCancel | Self::ActionStart
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Set,
    #[default]
    Query,
}

/// Which configuration a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    /// Live in-memory configuration.
    #[default]
    Current,
    /// Configuration persisted on the storage medium.
    Stored,
    /// Factory defaults.
    Defaults,
}

/// Status returned by every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    /// Advance to the next transition.
    Continue,
    /// Re-issue the same transition on a later step.
    Busy,
    /// Session finished (session-end only).
    Done,
    /// Abort the session.
    Error,
}

// ───────────────────────────────────────────────────────────────
// Values
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnOff {
    Off,
    On,
}

impl From<bool> for OnOff {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl From<OnOff> for bool {
    fn from(v: OnOff) -> Self {
        v == OnOff::On
    }
}

/// Typed element value union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementValue {
    Boolean(bool),
    OnOff(OnOff),
    SignedInteger(i32),
    UnsignedInteger(u32),
    Float(f32),
    Enum(u32),
    String(ValueString),
}

impl ElementValue {
    /// Build a string value, truncating at a char boundary to [`MAX_STRING_LEN`].
    pub fn string(s: &str) -> Self {
        Self::String(truncated(s))
    }

    pub fn as_unsigned(&self) -> Option<u32> {
        match self {
            Self::UnsignedInteger(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_on_off(&self) -> Option<OnOff> {
        match self {
            Self::OnOff(v) => Some(*v),
            _ => None,
        }
    }
}

/// Copy `s` into a fixed-capacity string, dropping whatever does not fit.
pub fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ───────────────────────────────────────────────────────────────
// Request payload
// ───────────────────────────────────────────────────────────────

/// Addressed group instance. `index` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    #[serde(flatten)]
    pub key: GroupKey,
    #[serde(default = "first_index")]
    pub index: u16,
}

fn first_index() -> u16 {
    1
}

impl Default for GroupRef {
    fn default() -> Self {
        Self {
            key: GroupKey {
                kind: GroupType::Setting,
                id: 0,
            },
            index: 1,
        }
    }
}

/// How a list-start addresses the collection instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceRef {
    Index(u16),
    Key(KeyName),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSelector {
    pub collection: CollectionId,
    pub instance: InstanceRef,
}

/// One decoded remote-configuration transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub kind: RequestKind,
    /// `None` on transitions that do not carry one; an implicit action
    /// opened without it is fixed by the first group-process or action-end.
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub group: GroupRef,
    #[serde(default)]
    pub element: ElementId,
    #[serde(default)]
    pub value: Option<ElementValue>,
    #[serde(default)]
    pub list: Option<ListSelector>,
    #[serde(default)]
    pub source: QuerySource,
}

impl Request {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            action: None,
            group: GroupRef::default(),
            element: 0,
            value: None,
            list: None,
            source: QuerySource::Current,
        }
    }

    pub fn session_start() -> Self {
        Self::new(RequestKind::SessionStart)
    }

    pub fn session_end() -> Self {
        Self::new(RequestKind::SessionEnd)
    }

    pub fn session_cancel() -> Self {
        Self::new(RequestKind::SessionCancel)
    }

    pub fn action_start(action: Action) -> Self {
        Self::new(RequestKind::ActionStart).with_action(action)
    }

    pub fn action_end(action: Action) -> Self {
        Self::new(RequestKind::ActionEnd).with_action(action)
    }

    pub fn group_start(key: GroupKey, index: u16) -> Self {
        Self::new(RequestKind::GroupStart).with_group(key, index)
    }

    pub fn group_end(key: GroupKey, index: u16) -> Self {
        Self::new(RequestKind::GroupEnd).with_group(key, index)
    }

    pub fn set(key: GroupKey, index: u16, element: ElementId, value: ElementValue) -> Self {
        let mut r = Self::new(RequestKind::GroupProcess)
            .with_group(key, index)
            .with_action(Action::Set);
        r.element = element;
        r.value = Some(value);
        r
    }

    pub fn query(key: GroupKey, index: u16, element: ElementId) -> Self {
        let mut r = Self::new(RequestKind::GroupProcess)
            .with_group(key, index)
            .with_action(Action::Query);
        r.element = element;
        r
    }

    pub fn list_start(key: GroupKey, index: u16, collection: CollectionId, instance: InstanceRef) -> Self {
        let mut r = Self::new(RequestKind::ListStart).with_group(key, index);
        r.list = Some(ListSelector {
            collection,
            instance,
        });
        r
    }

    pub fn list_end(key: GroupKey, index: u16, collection: CollectionId) -> Self {
        let mut r = Self::new(RequestKind::ListEnd).with_group(key, index);
        r.list = Some(ListSelector {
            collection,
            instance: InstanceRef::Index(0),
        });
        r
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_group(mut self, key: GroupKey, index: u16) -> Self {
        self.group = GroupRef { key, index };
        self
    }

    pub fn with_source(mut self, source: QuerySource) -> Self {
        self.source = source;
        self
    }
}

// ───────────────────────────────────────────────────────────────
// Response slot
// ───────────────────────────────────────────────────────────────

/// Destination filled by whoever handled the transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Queried element value.
    pub value: Option<ElementValue>,
    /// Hint sent to the remote peer alongside an error.
    pub error_hint: Option<&'static str>,
    /// Set by the callback: the group (on group-start) or element (on
    /// group-process) is not available and is skipped.
    pub not_available: bool,
    /// Current instance count of a variable collection, reported on list-start.
    pub list_count: Option<u16>,
    /// Set by the engine when a transition was not dispatched.
    pub skipped: bool,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
