//! Busy re-issue and session cancellation.

use cloudlink::rci::request::InstanceRef;
use cloudlink::rci::session::{Phase, Stage};
use cloudlink::rci::{Action, CallbackStatus, Request, RequestKind};

use crate::mock_app::{NETWORK, Reply, Rig, SERIAL};

#[test]
fn busy_transition_keeps_phase_until_reissued() {
    let mut rig = Rig::new();
    rig.app.reply(RequestKind::GroupStart, Reply::busy());
    let mut s = rig.open();
    rig.run(&mut s, [Request::session_start(), Request::action_start(Action::Query)]);

    assert_eq!(rig.step(&mut s, Request::group_start(SERIAL, 1)), CallbackStatus::Busy);
    assert_eq!(s.phase(), Phase::Action);
    let pending = s.pending().unwrap();
    assert_eq!(pending.kind, RequestKind::GroupStart);
    assert_eq!(pending.stage, Stage::Dispatch);

    assert_eq!(rig.step(&mut s, Request::group_start(SERIAL, 1)), CallbackStatus::Continue);
    assert_eq!(s.phase(), Phase::Group);
    assert!(s.pending().is_none());
    assert_eq!(rig.app.count(RequestKind::GroupStart), 2);
}

#[test]
fn busy_session_end_is_retried() {
    let mut rig = Rig::new();
    rig.app.reply(RequestKind::SessionEnd, Reply::busy());
    let mut s = rig.open();
    rig.run(&mut s, [Request::session_start()]);
    assert_eq!(rig.step(&mut s, Request::session_end()), CallbackStatus::Busy);
    assert!(!s.is_closed());
    assert_eq!(rig.step(&mut s, Request::session_end()), CallbackStatus::Done);
    assert!(s.is_closed());
}

#[test]
fn other_transition_while_pending_is_out_of_sequence() {
    let mut rig = Rig::new();
    rig.app.reply(RequestKind::GroupProcess, Reply::busy());
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, SERIAL, 1);
    assert_eq!(rig.step(&mut s, Request::query(SERIAL, 1, 0)), CallbackStatus::Busy);

    assert_eq!(rig.step(&mut s, Request::group_end(SERIAL, 1)), CallbackStatus::Error);
    assert_eq!(rig.response.error_hint, Some("out of sequence"));
    assert!(s.is_closed());
}

#[test]
fn busy_element_is_forwarded_again() {
    let mut rig = Rig::new();
    rig.app.reply(RequestKind::GroupProcess, Reply::busy());
    rig.app.reply(RequestKind::GroupProcess, Reply::busy());
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, SERIAL, 1);

    assert_eq!(rig.step(&mut s, Request::query(SERIAL, 1, 0)), CallbackStatus::Busy);
    assert_eq!(rig.step(&mut s, Request::query(SERIAL, 1, 0)), CallbackStatus::Busy);
    assert_eq!(rig.step(&mut s, Request::query(SERIAL, 1, 0)), CallbackStatus::Continue);
    assert_eq!(rig.app.count(RequestKind::GroupProcess), 3);
}

#[test]
fn busy_list_start_does_not_push_twice() {
    let mut rig = Rig::new();
    rig.app.reply(RequestKind::ListStart, Reply::busy());
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, NETWORK, 1);

    let start = Request::list_start(NETWORK, 1, 0, InstanceRef::Index(1));
    assert_eq!(rig.step(&mut s, start.clone()), CallbackStatus::Busy);
    assert_eq!(s.list().depth(), 1);
    assert_eq!(rig.step(&mut s, start), CallbackStatus::Continue);
    assert_eq!(s.list().depth(), 1);
    assert_eq!(s.list().top().unwrap().instance, Some(1));
}

#[test]
fn cancel_is_accepted_in_every_phase() {
    let prefixes: [&[Request]; 4] = [
        &[],
        &[Request::session_start()],
        &[Request::session_start(), Request::action_start(Action::Query)],
        &[
            Request::session_start(),
            Request::action_start(Action::Query),
            Request::group_start(SERIAL, 1),
        ],
    ];
    for prefix in prefixes {
        let mut rig = Rig::new();
        let mut s = rig.open();
        rig.run(&mut s, prefix.iter().cloned());
        assert_eq!(rig.step(&mut s, Request::session_cancel()), CallbackStatus::Continue);
        assert!(s.is_closed());
        assert_eq!(rig.app.calls.last().map(|r| r.kind), Some(RequestKind::SessionCancel));
    }
}

#[test]
fn cancel_while_pending_tears_down() {
    let mut rig = Rig::new();
    rig.app.reply(RequestKind::GroupProcess, Reply::busy());
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Query, SERIAL, 1);
    assert_eq!(rig.step(&mut s, Request::query(SERIAL, 1, 0)), CallbackStatus::Busy);

    assert_eq!(rig.step(&mut s, Request::session_cancel()), CallbackStatus::Continue);
    assert!(s.is_closed());
    assert!(s.pending().is_none());
    assert_eq!(s.active_group(), None);
}

#[test]
fn cancel_releases_locks_and_levels() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Set, NETWORK, 1);
    rig.run(
        &mut s,
        [
            Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0)),
            Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0)),
        ],
    );
    assert_eq!(rig.engine.locks().held_by(s.id()), 1);

    rig.run(&mut s, [Request::session_cancel()]);
    assert_eq!(rig.engine.locks().held(), 0);
    assert!(s.list().is_empty());
}

#[test]
fn abandon_releases_without_notifying_app() {
    let mut rig = Rig::new();
    let mut s = rig.open();
    rig.open_group(&mut s, Action::Set, NETWORK, 1);
    rig.run(
        &mut s,
        [
            Request::list_start(NETWORK, 1, 0, InstanceRef::Index(1)),
            Request::list_start(NETWORK, 1, 0, InstanceRef::Index(0)),
        ],
    );
    let forwarded = rig.app.calls.len();

    rig.engine.abandon(&mut s);
    assert!(s.is_closed());
    assert_eq!(rig.engine.locks().held(), 0);
    assert_eq!(rig.app.calls.len(), forwarded);
}
