//! Fuzz target: `Engine::step`
//!
//! Decodes arbitrary bytes into transitions for two interleaved sessions and
//! steps them through an engine with the built-in handlers registered.
//! Under the log-and-ignore policy the engine must never panic, closed
//! sessions must hold no locks, and cancelling everything must free the
//! lock table.
//!
//! cargo fuzz run fuzz_session_steps

#![no_main]

use cloudlink::adapters::nvs::NvsStore;
use cloudlink::config::{EngineConfig, InvariantPolicy};
use cloudlink::rci::request::{ElementValue, InstanceRef};
use cloudlink::rci::{Action, CallbackStatus, Engine, Request, RequestKind, Response};
use cloudlink::schema::{Collection, CollectionKind, Element, ElementType, Group, GroupKey, SchemaCatalog};
use libfuzzer_sys::fuzz_target;

const KINDS: [RequestKind; 10] = [
    RequestKind::SessionStart,
    RequestKind::SessionEnd,
    RequestKind::SessionCancel,
    RequestKind::ActionStart,
    RequestKind::ActionEnd,
    RequestKind::GroupStart,
    RequestKind::GroupEnd,
    RequestKind::GroupProcess,
    RequestKind::ListStart,
    RequestKind::ListEnd,
];

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new().with_setting(
        Group::new(2, "network").with_collection(
            Collection::new("interfaces", CollectionKind::FixedArray, 2)
                .with_element(Element::new("mtu", ElementType::Uint32))
                .with_collection(
                    Collection::new("routes", CollectionKind::VariableArray, 3)
                        .with_element(Element::new("metric", ElementType::Uint32)),
                ),
        ),
    )
}

/// Four bytes per transition: session/kind, group, element, value.
fn decode(chunk: &[u8]) -> (usize, Request) {
    let kind = KINDS[usize::from(chunk[0] & 0x0f) % KINDS.len()];
    let action = if chunk[0] & 0x10 == 0 { Action::Query } else { Action::Set };
    let key = match chunk[1] >> 6 {
        0 => GroupKey::setting(2),
        1 => GroupKey::setting(200),
        2 => GroupKey::setting(201),
        _ => GroupKey::state(u16::from(chunk[1] & 0x0f)),
    };
    let index = u16::from(chunk[1] & 0x07);
    let mut r = Request::new(kind).with_action(action).with_group(key, index);
    r.element = u16::from(chunk[2] & 0x0f);
    r.value = match chunk[3] >> 6 {
        0 => None,
        1 => Some(ElementValue::UnsignedInteger(u32::from(chunk[3] & 0x3f))),
        2 => Some(ElementValue::string("/fuzz")),
        _ => Some(ElementValue::Boolean(chunk[3] & 1 == 1)),
    };
    if matches!(kind, RequestKind::ListStart | RequestKind::ListEnd) {
        r = Request::list_start(key, index, u16::from(chunk[2] >> 7), InstanceRef::Index(u16::from(chunk[3] & 0x03)))
            .with_action(action);
        r.kind = kind;
    }
    if chunk[0] & 0x20 != 0 {
        r.action = None;
    }
    (usize::from(chunk[0] >> 7), r)
}

fuzz_target!(|data: &[u8]| {
    let config = EngineConfig {
        invariant_policy: InvariantPolicy::LogAndIgnore,
        ..EngineConfig::default()
    };
    let Ok(engine) = Engine::new(catalog(), config) else {
        return;
    };
    let Ok(mut engine) = engine.with_builtins() else {
        return;
    };
    let mut nvs = NvsStore::new();
    let mut response = Response::new();
    let mut sessions = [engine.open_session(), engine.open_session()];
    let mut app = |request: &Request, response: &mut Response| {
        if request.kind == RequestKind::ListStart {
            response.list_count = Some(request.element % 4);
        }
        CallbackStatus::Continue
    };

    for chunk in data.chunks_exact(4) {
        let (which, request) = decode(chunk);
        let s = &mut sessions[which];
        let status = engine.step(s, &request, &mut response, &mut app, &mut nvs);
        if status == CallbackStatus::Error {
            assert!(s.is_closed(), "error left session open");
        }
        if s.is_closed() {
            assert_eq!(engine.locks().held_by(s.id()), 0, "closed session holds locks");
        }
    }

    for s in sessions.iter_mut() {
        engine.step(s, &Request::session_cancel(), &mut response, &mut app, &mut nvs);
    }
    assert_eq!(engine.locks().held(), 0, "cancel must free every lock");
});
