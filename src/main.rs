//! rci-replay — drive the RCI engine from a recorded transition script.
//!
//! Loads a schema catalog, an optional engine config and a script of
//! transitions (all JSON), then steps every scripted session against the
//! logging application adapter and an in-memory NVS partition.
//!
//! Script format: an array of steps, each a request plus the index of the
//! session it belongs to.
//!
//! ```json
//! [
//!   { "session": 0, "kind": "session_start" },
//!   { "session": 0, "kind": "action_start", "action": "set" },
//!   { "session": 0, "kind": "group_start", "group": { "id": 200, "index": 1 } },
//!   { "session": 0, "kind": "group_process", "action": "set",
//!     "group": { "id": 200, "index": 1 }, "element": 1,
//!     "value": { "unsigned_integer": 30 } }
//! ]
//! ```
//!
//! Sessions are interleaved one step per round. A `busy` step stays at the
//! head of its session's queue and is re-issued next round, up to
//! `--busy-retries` times before the session is abandoned. An `error`
//! closes the session, so its remaining steps are skipped up to the next
//! `session_start`.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use serde::Deserialize;

use cloudlink::adapters::log_sink::LoggingApp;
use cloudlink::adapters::nvs::NvsStore;
use cloudlink::config::EngineConfig;
use cloudlink::rci::{CallbackStatus, Engine, Request, RequestKind, Response, Session};
use cloudlink::schema::SchemaCatalog;

#[derive(Parser, Debug)]
#[command(name = "rci-replay", about = "Replay a remote configuration transition script")]
struct Args {
    /// Schema catalog (JSON).
    #[arg(long)]
    schema: PathBuf,

    /// Transition script (JSON array of steps).
    #[arg(long)]
    script: PathBuf,

    /// Engine configuration (JSON); defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Times a busy step is re-issued before its session is abandoned.
    #[arg(long, default_value_t = 8)]
    busy_retries: u32,

    /// Do not register the built-in handler groups.
    #[arg(long)]
    no_builtins: bool,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    session: usize,
    #[serde(flatten)]
    request: Request,
}

struct Lane {
    session: Session,
    steps: VecDeque<Step>,
    attempts: u32,
}

/// Drop the failed head step and everything after it that belongs to the
/// closed session. Returns how many steps were dropped.
fn skip_closed_session(steps: &mut VecDeque<Step>) -> usize {
    let rest = steps
        .iter()
        .skip(1)
        .position(|s| s.request.kind == RequestKind::SessionStart)
        .map_or(steps.len(), |i| i + 1);
    steps.drain(..rest);
    rest
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let catalog: SchemaCatalog = load_json(&args.schema)?;
    let config: EngineConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => EngineConfig::default(),
    };
    let script: Vec<Step> = load_json(&args.script)?;
    if script.is_empty() {
        bail!("script {} has no steps", args.script.display());
    }

    let mut engine = Engine::new(catalog, config)?;
    if !args.no_builtins {
        engine = engine.with_builtins()?;
    }
    let mut nvs = NvsStore::new();
    let mut app = LoggingApp::new();
    engine.load(&nvs);

    let mut lanes: Vec<Lane> = Vec::new();
    for step in script {
        while lanes.len() <= step.session {
            let session = engine.open_session();
            lanes.push(Lane {
                session,
                steps: VecDeque::new(),
                attempts: 0,
            });
        }
        lanes[step.session].steps.push_back(step);
    }

    let mut response = Response::new();
    let mut errors = 0usize;
    while lanes.iter().any(|l| !l.steps.is_empty()) {
        for lane in lanes.iter_mut() {
            let Some(step) = lane.steps.front() else {
                continue;
            };
            let status = engine.step(&mut lane.session, &step.request, &mut response, &mut app, &mut nvs);
            println!(
                "session {} {:?} -> {:?}{}{}",
                lane.session.id(),
                step.request.kind,
                status,
                response.value.as_ref().map(|v| format!(" value={v:?}")).unwrap_or_default(),
                response.error_hint.map(|h| format!(" hint={h}")).unwrap_or_default(),
            );

            match status {
                CallbackStatus::Busy => {
                    lane.attempts += 1;
                    if lane.attempts > args.busy_retries {
                        warn!("session {} still busy after {} retries, abandoning", lane.session.id(), args.busy_retries);
                        engine.abandon(&mut lane.session);
                        lane.steps.clear();
                        errors += 1;
                    }
                }
                CallbackStatus::Error => {
                    let skipped = skip_closed_session(&mut lane.steps);
                    if skipped > 1 {
                        warn!("session {} closed by error, {} step(s) skipped", lane.session.id(), skipped - 1);
                    }
                    lane.attempts = 0;
                    errors += 1;
                }
                CallbackStatus::Continue | CallbackStatus::Done => {
                    lane.steps.pop_front();
                    lane.attempts = 0;
                }
            }
        }
    }

    for lane in lanes.iter_mut() {
        if !lane.session.is_closed() {
            engine.abandon(&mut lane.session);
        }
    }
    info!(
        "replay finished: {} transition(s) forwarded, {} blob write(s), {} record(s) stored, {} error(s)",
        app.transitions(),
        nvs.write_count(),
        nvs.len(),
        errors
    );
    if errors > 0 {
        bail!("{errors} step(s) failed");
    }
    Ok(())
}
