//! Mock application callback and shared fixtures for integration tests.
//!
//! `MockApp` records every forwarded request so tests can assert on the
//! exact transition history, and replays scripted replies per request kind.

use std::collections::{HashMap, VecDeque};

use cloudlink::adapters::nvs::NvsStore;
use cloudlink::app::ports::AppCallback;
use cloudlink::config::{EngineConfig, InvariantPolicy};
use cloudlink::rci::request::ElementValue;
use cloudlink::rci::{Action, CallbackStatus, Engine, Request, RequestKind, Response, Session};
use cloudlink::schema::{
    Access, Collection, CollectionKind, Element, ElementType, Group, GroupKey, SchemaCatalog, ValueLimit,
};

// ── Groups in the fixture catalog ─────────────────────────────

pub const SERIAL: GroupKey = GroupKey::setting(1);
pub const NETWORK: GroupKey = GroupKey::setting(2);
pub const HOSTS: GroupKey = GroupKey::setting(3);
pub const STATS: GroupKey = GroupKey::state(1);
/// Not described by the catalog; owned entirely by the application.
pub const VENDOR: GroupKey = GroupKey::setting(99);

pub const ENHANCED: GroupKey = GroupKey::setting(200);
pub const HEALTH: GroupKey = GroupKey::setting(201);

pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::new()
        .with_setting(
            Group::new(SERIAL.id, "serial")
                .with_instances(2)
                .with_element(
                    Element::new("baud", ElementType::Enum).with_limit(ValueLimit::Enumeration { count: 4 }),
                )
                .with_element(
                    Element::new("name", ElementType::String)
                        .with_limit(ValueLimit::StringLength { min: 1, max: 16 }),
                )
                .with_element(Element::new("uptime", ElementType::Uint32).with_access(Access::ReadOnly))
                .with_element(Element::new("secret", ElementType::Password).with_access(Access::WriteOnly)),
        )
        .with_setting(
            Group::new(NETWORK.id, "network").with_collection(
                Collection::new("interfaces", CollectionKind::FixedDictionary, 2)
                    .with_keys(&["eth0", "wlan0"])
                    .with_element(Element::new("mtu", ElementType::Uint32))
                    .with_collection(
                        Collection::new("routes", CollectionKind::VariableArray, 3)
                            .with_element(Element::new("gateway", ElementType::Ipv4))
                            .with_element(Element::new("metric", ElementType::Uint32)),
                    ),
            ),
        )
        .with_setting(
            Group::new(HOSTS.id, "hosts").with_collection(
                Collection::new("entries", CollectionKind::VariableDictionary, 2)
                    .with_keys(&["primary"])
                    .with_element(Element::new("address", ElementType::String)),
            ),
        )
        .with_state(
            Group::new(STATS.id, "device_stats")
                .with_element(Element::new("uptime", ElementType::Uint32).with_access(Access::ReadOnly)),
        )
}

pub fn lenient() -> EngineConfig {
    EngineConfig {
        invariant_policy: InvariantPolicy::LogAndIgnore,
        ..EngineConfig::default()
    }
}

// ── Scripted replies ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reply {
    pub status: CallbackStatus,
    pub not_available: bool,
    pub list_count: Option<u16>,
}

#[allow(dead_code)]
impl Reply {
    pub fn status(status: CallbackStatus) -> Self {
        Self {
            status,
            not_available: false,
            list_count: None,
        }
    }

    pub fn busy() -> Self {
        Self::status(CallbackStatus::Busy)
    }

    pub fn error() -> Self {
        Self::status(CallbackStatus::Error)
    }

    pub fn done() -> Self {
        Self::status(CallbackStatus::Done)
    }

    pub fn not_available() -> Self {
        Self {
            not_available: true,
            ..Self::status(CallbackStatus::Continue)
        }
    }

    pub fn list_count(count: u16) -> Self {
        Self {
            list_count: Some(count),
            ..Self::status(CallbackStatus::Continue)
        }
    }
}

// ── MockApp ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockApp {
    pub calls: Vec<Request>,
    replies: HashMap<RequestKind, VecDeque<Reply>>,
    values: HashMap<(GroupKey, u16, u16), ElementValue>,
}

#[allow(dead_code)]
impl MockApp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for the next forwarded request of `kind`.
    pub fn reply(&mut self, kind: RequestKind, reply: Reply) {
        self.replies.entry(kind).or_default().push_back(reply);
    }

    pub fn kinds(&self) -> Vec<RequestKind> {
        self.calls.iter().map(|r| r.kind).collect()
    }

    pub fn count(&self, kind: RequestKind) -> usize {
        self.calls.iter().filter(|r| r.kind == kind).count()
    }

    pub fn saw_group(&self, key: GroupKey) -> bool {
        self.calls.iter().any(|r| !r.kind.is_session_level() && r.group.key == key)
    }

    pub fn value(&self, key: GroupKey, index: u16, element: u16) -> Option<&ElementValue> {
        self.values.get(&(key, index, element))
    }
}

impl AppCallback for MockApp {
    fn remote_config(&mut self, request: &Request, response: &mut Response) -> CallbackStatus {
        self.calls.push(request.clone());
        let reply = self
            .replies
            .get_mut(&request.kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::status(CallbackStatus::Continue));

        if request.kind == RequestKind::GroupProcess && reply.status == CallbackStatus::Continue {
            let slot = (request.group.key, request.group.index, request.element);
            match request.action {
                Some(Action::Set) => {
                    if let Some(v) = &request.value {
                        self.values.insert(slot, v.clone());
                    }
                }
                Some(Action::Query) | None => response.value = self.values.get(&slot).cloned(),
            }
        }
        response.not_available = reply.not_available;
        response.list_count = reply.list_count;
        reply.status
    }
}

// ── Rig: engine + app + storage ───────────────────────────────

pub struct Rig {
    pub engine: Engine,
    pub app: MockApp,
    pub nvs: NvsStore,
    pub response: Response,
}

#[allow(dead_code)]
impl Rig {
    /// Fixture catalog, lenient invariant policy, built-ins registered.
    pub fn new() -> Self {
        Self::with_config(lenient())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let engine = Engine::new(catalog(), config).unwrap().with_builtins().unwrap();
        Self::with_engine(engine)
    }

    pub fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            app: MockApp::new(),
            nvs: NvsStore::new(),
            response: Response::new(),
        }
    }

    pub fn open(&mut self) -> Session {
        self.engine.open_session()
    }

    pub fn step(&mut self, session: &mut Session, request: Request) -> CallbackStatus {
        self.engine
            .step(session, &request, &mut self.response, &mut self.app, &mut self.nvs)
    }

    /// Step every request, asserting each continues.
    pub fn run(&mut self, session: &mut Session, requests: impl IntoIterator<Item = Request>) {
        for request in requests {
            let kind = request.kind;
            assert_eq!(self.step(session, request), CallbackStatus::Continue, "{:?}", kind);
        }
    }

    /// session-start, action-start, group-start.
    pub fn open_group(&mut self, session: &mut Session, action: Action, key: GroupKey, index: u16) {
        self.run(
            session,
            [
                Request::session_start(),
                Request::action_start(action),
                Request::group_start(key, index).with_action(action),
            ],
        );
    }

    /// group-end, action-end, session-end; returns the session-end status.
    pub fn close_group(&mut self, session: &mut Session, action: Action, key: GroupKey, index: u16) -> CallbackStatus {
        self.run(session, [Request::group_end(key, index), Request::action_end(action)]);
        self.step(session, Request::session_end())
    }
}
