//! Fuzz target: JSON request decoding
//!
//! Feeds arbitrary bytes to the `Request` deserializer used by the replay
//! tool. Whatever parses is stepped through a fresh session; neither the
//! decoder nor the engine may panic.
//!
//! cargo fuzz run fuzz_request_json

#![no_main]

use cloudlink::adapters::nvs::NvsStore;
use cloudlink::config::{EngineConfig, InvariantPolicy};
use cloudlink::rci::{CallbackStatus, Engine, Request, Response};
use cloudlink::schema::SchemaCatalog;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(request) = serde_json::from_slice::<Request>(data) else {
        return;
    };
    let config = EngineConfig {
        invariant_policy: InvariantPolicy::LogAndIgnore,
        ..EngineConfig::default()
    };
    let Ok(engine) = Engine::new(SchemaCatalog::new(), config) else {
        return;
    };
    let Ok(mut engine) = engine.with_builtins() else {
        return;
    };
    let mut nvs = NvsStore::new();
    let mut response = Response::new();
    let mut session = engine.open_session();
    let mut app = |_: &Request, _: &mut Response| CallbackStatus::Continue;

    engine.step(&mut session, &Request::session_start(), &mut response, &mut app, &mut nvs);
    engine.step(&mut session, &request, &mut response, &mut app, &mut nvs);
    engine.abandon(&mut session);
    assert_eq!(engine.locks().held(), 0);
});
