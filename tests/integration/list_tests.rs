//! Nested collections: resolution by index and key, appends, depth limits.

use cloudlink::config::EngineConfig;
use cloudlink::rci::request::{ElementValue, InstanceRef, KeyName};
use cloudlink::rci::{Action, CallbackStatus, Engine, Request, RequestKind};
use cloudlink::schema::{GroupKey, SchemaCatalog};

use crate::mock_app::{HOSTS, NETWORK, Reply, Rig, SERIAL, VENDOR, lenient};

fn key(name: &str) -> InstanceRef {
    InstanceRef::Key(KeyName::try_from(name).unwrap())
}

#[test]
fn fixed_dictionary_resolves_by_key() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Set, NETWORK, 1);

    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, key("wlan0"))]);
    let top = s.list().top().unwrap();
    assert_eq!(top.instance, Some(1));
    assert_eq!(top.count, 2);
    assert_eq!(top.lock, None);

    rig.run(
        &mut s,
        [
            Request::set(NETWORK, 1, 0, ElementValue::UnsignedInteger(1500)),
            Request::list_end(NETWORK, 1, 0),
        ],
    );
    assert!(s.list().is_empty());
    assert_eq!(rig.app.count(RequestKind::ListStart), 1);
    assert_eq!(rig.app.count(RequestKind::ListEnd), 1);
}

#[test]
fn unknown_key_in_fixed_dictionary_is_invalid() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    assert_eq!(
        rig.step(&mut s, Request::list_start(NETWORK, 1, 0, key("ppp0"))),
        CallbackStatus::Error
    );
    assert_eq!(rig.response.error_hint, Some("invalid index"));
}

#[test]
fn fixed_instance_beyond_capacity_is_invalid() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    assert_eq!(
        rig.step(&mut s, Request::list_start(NETWORK, 1, 0, InstanceRef::Index(2))),
        CallbackStatus::Error
    );
    assert_eq!(rig.response.error_hint, Some("invalid index"));
}

#[test]
fn variable_array_appends_at_count() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Set, NETWORK, 1);
    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0))]);

    rig.app.reply(RequestKind::ListStart, Reply::list_count(1));
    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, InstanceRef::Index(1))]);
    let top = s.list().top().unwrap();
    assert_eq!(top.instance, Some(1));
    assert_eq!(top.count, 2);
    assert!(top.lock.is_some());

    rig.run(
        &mut s,
        [
            Request::set(NETWORK, 1, 0, ElementValue::string("10.0.0.1")),
            Request::set(NETWORK, 1, 1, ElementValue::UnsignedInteger(10)),
            Request::list_end(NETWORK, 1, 0),
        ],
    );
    assert_eq!(s.list().depth(), 1);
    assert_eq!(rig.engine.locks().held(), 0);
}

#[test]
fn variable_array_rejects_gaps() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Set, NETWORK, 1);
    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0))]);

    // Reported count 0: index 1 would leave a hole.
    assert_eq!(
        rig.step(&mut s, Request::list_start(NETWORK, 1, 0, InstanceRef::Index(1))),
        CallbackStatus::Error
    );
    assert_eq!(rig.response.error_hint, Some("invalid index"));
}

#[test]
fn reported_count_is_clamped_to_capacity() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0))]);

    rig.app.reply(RequestKind::ListStart, Reply::list_count(10));
    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, InstanceRef::Index(2))]);
    assert_eq!(s.list().top().unwrap().count, 3);
    rig.run(&mut s, [Request::list_end(NETWORK, 1, 0)]);

    rig.app.reply(RequestKind::ListStart, Reply::list_count(10));
    assert_eq!(
        rig.step(&mut s, Request::list_start(NETWORK, 1, 0, InstanceRef::Index(3))),
        CallbackStatus::Error
    );
}

#[test]
fn variable_dictionary_appends_unknown_key() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Set, HOSTS, 1);

    rig.app.reply(RequestKind::ListStart, Reply::list_count(1));
    rig.run(&mut s, [Request::list_start(HOSTS, 1, 0, key("backup"))]);
    let top = s.list().top().unwrap();
    assert_eq!(top.instance, Some(1));
    assert_eq!(top.dynamic_key.as_deref(), Some("backup"));
    assert_eq!(rig.engine.locks().held_by(s.id()), 1);

    rig.run(&mut s, [Request::list_end(HOSTS, 1, 0)]);

    // Capacity 2 is now reached.
    rig.app.reply(RequestKind::ListStart, Reply::list_count(2));
    assert_eq!(
        rig.step(&mut s, Request::list_start(HOSTS, 1, 0, key("spare"))),
        CallbackStatus::Error
    );
}

#[test]
fn static_key_of_variable_dictionary_resolves_in_place() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, HOSTS, 1);
    rig.app.reply(RequestKind::ListStart, Reply::list_count(1));
    rig.run(&mut s, [Request::list_start(HOSTS, 1, 0, key("primary"))]);
    let top = s.list().top().unwrap();
    assert_eq!(top.instance, Some(0));
    assert_eq!(top.dynamic_key, None);
}

#[test]
fn element_table_follows_open_level() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0))]);

    // interfaces has a single element.
    rig.run(&mut s, [Request::query(NETWORK, 1, 0)]);
    assert!(!rig.response.skipped);
    assert_eq!(rig.step(&mut s, Request::query(NETWORK, 1, 1)), CallbackStatus::Continue);
    assert!(rig.response.skipped);
}

#[test]
fn unknown_collection_is_rejected() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    assert_eq!(
        rig.step(&mut s, Request::list_start(NETWORK, 1, 5, InstanceRef::Index(0))),
        CallbackStatus::Error
    );
    assert_eq!(rig.response.error_hint, Some("unknown collection"));
}

#[test]
fn groups_without_collections_reject_lists() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, SERIAL, 1);
    assert_eq!(
        rig.step(&mut s, Request::list_start(SERIAL, 1, 0, InstanceRef::Index(0))),
        CallbackStatus::Error
    );
}

#[test]
fn lists_on_uncatalogued_groups_are_unknown_group() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, VENDOR, 1);
    assert_eq!(
        rig.step(&mut s, Request::list_start(VENDOR, 1, 0, InstanceRef::Index(0))),
        CallbackStatus::Error
    );
    assert_eq!(rig.response.error_hint, Some("unknown group"));
}

#[test]
fn list_end_must_match_top_collection() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0))]);
    assert_eq!(rig.step(&mut s, Request::list_end(NETWORK, 1, 1)), CallbackStatus::Error);
    assert_eq!(rig.response.error_hint, Some("out of sequence"));
}

#[test]
fn list_end_without_level_is_ignored_when_lenient() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    assert_eq!(rig.step(&mut s, Request::list_end(NETWORK, 1, 0)), CallbackStatus::Continue);
    assert!(rig.response.skipped);
    assert_eq!(rig.app.count(RequestKind::ListEnd), 0);
}

#[test]
fn group_end_unwinds_open_levels() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Set, NETWORK, 1);
    rig.run(
        &mut s,
        [
            Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0)),
            Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0)),
            Request::group_end(NETWORK, 1),
        ],
    );
    assert!(s.list().is_empty());
    assert_eq!(rig.engine.locks().held(), 0);
}

#[test]
fn global_depth_limit_truncates_session() {
    let mut rig = Rig::with_config(EngineConfig {
        max_list_depth: 1,
        ..lenient()
    });
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    rig.run(&mut s, [Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0))]);

    assert_eq!(
        rig.step(&mut s, Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0))),
        CallbackStatus::Error
    );
    assert_eq!(rig.response.error_hint, Some("internal error"));
    assert!(s.is_closed());
}

#[test]
fn group_depth_limit_truncates_session() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);
    rig.run(
        &mut s,
        [
            Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0)),
            Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0)),
        ],
    );
    // routes declares no nested collection; network's depth is 2.
    assert_eq!(
        rig.step(&mut s, Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0))),
        CallbackStatus::Error
    );
    assert!(s.is_closed());
}

#[test]
fn json_catalog_without_max_depth_opens_lists() {
    let json = r#"{ "settings": [{
        "id": 7, "name": "ports",
        "collections": [{
            "name": "port", "kind": "fixed_array", "capacity": 3,
            "elements": [{ "name": "speed", "type": "uint32" }],
            "collections": [{
                "name": "vlan", "kind": "variable_array", "capacity": 2,
                "elements": [{ "name": "tag", "type": "uint32" }]
            }]
        }]
    }] }"#;
    let cat: SchemaCatalog = serde_json::from_str(json).unwrap();
    let engine = Engine::new(cat, lenient()).unwrap();
    let ports = GroupKey::setting(7);
    assert_eq!(engine.catalog().group(ports).unwrap().max_depth, 2);

    let mut rig = Rig::with_engine(engine);
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Set, ports, 1);
    rig.run(
        &mut s,
        [
            Request::list_start(ports, 1, 0, InstanceRef::Index(2)),
            Request::set(ports, 1, 0, ElementValue::UnsignedInteger(1000)),
            Request::list_start(ports, 1, 0, InstanceRef::Index(0)),
            Request::set(ports, 1, 0, ElementValue::UnsignedInteger(42)),
            Request::list_end(ports, 1, 0),
            Request::list_end(ports, 1, 0),
        ],
    );
    assert_eq!(rig.app.count(RequestKind::ListStart), 2);
    assert!(s.list().is_empty());
}
