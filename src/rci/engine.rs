//! RCI engine — applies one transition to one session per step.
//!
//! **Session-decoupled**: the engine owns the schema catalog, the router with
//! its built-in handlers, and the lock table shared by all sessions. Each
//! session's state lives in an explicit [`Session`] the caller passes in on
//! every [`Engine::step`], together with the application callback and the
//! storage medium.
//!
//! Every transition passes through three gates:
//!
//! 1. **Pending gate** — while a `busy` transition is outstanding only the
//!    same kind (or session-cancel) is accepted.
//! 2. **Phase gate** — the session phase table decides whether the
//!    transition is in sequence.
//! 3. **Schema gate** — group index, list structure, element id, access and
//!    value limits are checked against the catalog before dispatch.
//!
//! Invariant violations are reported at a single boundary,
//! [`Engine::report_violation`], governed by
//! [`InvariantPolicy`](crate::config::InvariantPolicy). Every other failure
//! becomes an `error` status, which tears the session down.

use log::{debug, error, info, warn};

use crate::app::ports::{AppCallback, StoragePort};
use crate::config::{EngineConfig, InvariantPolicy};
use crate::error::{Error, InvariantViolation, RequestError, Result, SetupError};
use crate::handlers::{DeviceHealthHandler, EnhancedServicesHandler};
use crate::rci::lock::{LockKey, LockManager};
use crate::rci::request::{Action, CallbackStatus, InstanceRef, Request, RequestKind, Response};
use crate::rci::router::{GroupHandler, HandlerContext, Router};
use crate::rci::session::{Pending, Phase, Session, SessionId, Stage};
use crate::schema::{SchemaCatalog, validate_set};

/// Outcome of applying a transition, before it is mapped to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Completed; move the session to this phase.
    Advance(Phase),
    /// Re-issue later, resuming at this stage.
    Busy(Stage),
    /// session-end completed; the session is already torn down.
    Done,
    /// A handler or the application answered `error`.
    Abort,
}

pub struct Engine {
    catalog: SchemaCatalog,
    config: EngineConfig,
    router: Router,
    locks: LockManager,
    next_session: u32,
}

impl Engine {
    /// Build an engine over `catalog` with no built-in handlers.
    pub fn new(mut catalog: SchemaCatalog, config: EngineConfig) -> core::result::Result<Self, SetupError> {
        config.validate().map_err(SetupError::Config)?;
        catalog.fill_depths();
        catalog.validate().map_err(SetupError::Schema)?;
        let locks = LockManager::new(config.lock_capacity);
        info!(
            "RCI: engine ready ({} setting / {} state groups, policy {:?})",
            catalog.settings.len(),
            catalog.state.len(),
            config.invariant_policy
        );
        Ok(Self {
            catalog,
            config,
            router: Router::new(),
            locks,
            next_session: 1,
        })
    }

    /// Register the enhanced-services and device-health handlers.
    pub fn with_builtins(mut self) -> core::result::Result<Self, SetupError> {
        self.register(Box::new(EnhancedServicesHandler::new()))?;
        self.register(Box::new(DeviceHealthHandler::new()))?;
        Ok(self)
    }

    /// Add a built-in handler. Its descriptor is published into the catalog
    /// unless the catalog already describes that group.
    pub fn register(&mut self, handler: Box<dyn GroupHandler>) -> core::result::Result<(), SetupError> {
        let key = handler.key();
        let descriptor = handler.descriptor();
        self.router.register(handler)?;
        if self.catalog.group(key).is_none() {
            self.catalog = core::mem::take(&mut self.catalog).with_group(key.kind, descriptor);
            self.catalog.validate().map_err(SetupError::Schema)?;
        }
        Ok(())
    }

    /// Restore every built-in handler's committed record.
    pub fn load(&mut self, storage: &dyn StoragePort) {
        self.router.load_all(storage, &self.config.storage_namespace);
    }

    pub fn open_session(&mut self) -> Session {
        let id = SessionId(self.next_session);
        self.next_session = self.next_session.wrapping_add(1).max(1);
        debug!("RCI[{}]: session opened", id);
        Session::new(id)
    }

    /// Tear a session down without notifying the application, e.g. when the
    /// transport drops. Locks are released and staged records discarded.
    pub fn abandon(&mut self, session: &mut Session) {
        if !session.is_closed() {
            warn!("RCI[{}]: session abandoned in {}", session.id(), session.phase().name());
        }
        self.teardown(session);
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Apply one transition. The whole response slot is reset first.
    pub fn step(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        storage: &mut dyn StoragePort,
    ) -> CallbackStatus {
        response.reset();
        debug!(
            "RCI[{}]: {:?} in {}",
            session.id(),
            request.kind,
            session.phase().name()
        );

        match self.apply(session, request, response, app, storage) {
            Ok(Flow::Advance(next)) => {
                session.pending = None;
                session.phase = next;
                CallbackStatus::Continue
            }
            Ok(Flow::Busy(stage)) => {
                debug!("RCI[{}]: {:?} busy at {:?}", session.id(), request.kind, stage);
                session.pending = Some(Pending {
                    kind: request.kind,
                    stage,
                });
                CallbackStatus::Busy
            }
            Ok(Flow::Done) => CallbackStatus::Done,
            Ok(Flow::Abort) => {
                warn!("RCI[{}]: {:?} answered error, session aborted", session.id(), request.kind);
                self.teardown(session);
                CallbackStatus::Error
            }
            Err(Error::Invariant(v)) => self.on_violation(session, request, response, v),
            Err(e) => {
                warn!("RCI[{}]: {:?} rejected: {}", session.id(), request.kind, e);
                response.error_hint = Some(e.hint());
                self.teardown(session);
                CallbackStatus::Error
            }
        }
    }

    /// Single reporting boundary for schema-contract violations.
    pub fn report_violation(&self, session: &Session, violation: InvariantViolation) {
        match self.config.invariant_policy {
            InvariantPolicy::Panic => {
                panic!("RCI[{}]: invariant violated: {}", session.id(), violation)
            }
            InvariantPolicy::LogAndIgnore => {
                error!("RCI[{}]: invariant violated: {}", session.id(), violation);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transition handlers
    // -----------------------------------------------------------------------

    fn apply(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        storage: &mut dyn StoragePort,
    ) -> Result<Flow> {
        if let Some(p) = session.pending {
            if p.kind != request.kind && request.kind != RequestKind::SessionCancel {
                warn!(
                    "RCI[{}]: {:?} while {:?} is pending",
                    session.id(),
                    request.kind,
                    p.kind
                );
                return Err(RequestError::OutOfSequence.into());
            }
        }
        let resume = session.resume_stage(request.kind);
        let next = session
            .next_phase(request)
            .ok_or(RequestError::OutOfSequence)?;

        match request.kind {
            RequestKind::SessionStart => {
                info!("RCI[{}]: session start", session.id());
                let status = app.remote_config(request, response);
                Ok(settle(request.kind, status, next, Stage::Dispatch))
            }
            RequestKind::SessionEnd => self.session_end(session, request, response, app, next),
            RequestKind::SessionCancel => self.session_cancel(session, request, response, app, next),
            RequestKind::ActionStart => {
                session.action = Some(request.action.unwrap_or_default());
                session.source = request.source;
                session.closed_group = None;
                let status = app.remote_config(request, response);
                Ok(settle(request.kind, status, next, Stage::Dispatch))
            }
            RequestKind::ActionEnd => self.action_end(session, request, response, app, storage, resume, next),
            RequestKind::GroupStart => self.group_start(session, request, response, app, storage, resume, next),
            RequestKind::GroupProcess => self.group_process(session, request, response, app, storage, next),
            RequestKind::GroupEnd => self.group_end(session, request, response, app, storage, resume, next),
            RequestKind::ListStart => self.list_start(session, request, response, app, storage, resume, next),
            RequestKind::ListEnd => self.list_end(session, request, response, app, storage, next),
        }
    }

    fn session_end(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        next: Phase,
    ) -> Result<Flow> {
        match app.remote_config(request, response) {
            CallbackStatus::Continue | CallbackStatus::Done => {
                self.teardown(session);
                info!("RCI[{}]: session end", session.id());
                Ok(Flow::Done)
            }
            status => Ok(settle(request.kind, status, next, Stage::Dispatch)),
        }
    }

    fn session_cancel(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        next: Phase,
    ) -> Result<Flow> {
        let released = self.teardown(session);
        info!("RCI[{}]: session cancelled, {} lock(s) released", session.id(), released);
        let status = app.remote_config(request, response);
        Ok(settle(request.kind, status, next, Stage::Dispatch))
    }

    #[allow(clippy::too_many_arguments)]
    fn action_end(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        storage: &mut dyn StoragePort,
        resume: Option<Stage>,
        next: Phase,
    ) -> Result<Flow> {
        if resume.is_none() {
            if session.group.is_some() {
                self.unwind(session);
                session.closed_group = session.group.take();
                session.group_skip = false;
            }
            let action = session.action.or(request.action).unwrap_or_default();
            session.action = Some(action);
            match action {
                Action::Set => {
                    let written =
                        self.router
                            .commit(session.id(), storage, &self.config.storage_namespace)?;
                    if written > 0 {
                        info!("RCI[{}]: committed {} record(s)", session.id(), written);
                    }
                }
                Action::Query => self.router.rollback(session.id()),
            }
        }
        let status = app.remote_config(request, response);
        Ok(settle(request.kind, status, next, Stage::Dispatch))
    }

    #[allow(clippy::too_many_arguments)]
    fn group_start(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        storage: &mut dyn StoragePort,
        resume: Option<Stage>,
        next: Phase,
    ) -> Result<Flow> {
        if resume.is_none() {
            if let Some(group) = self.catalog.group(request.group.key) {
                if !group.has_index(request.group.index) {
                    return Err(RequestError::InvalidIndex.into());
                }
            }
            if session.phase == Phase::Session {
                session.action = request.action;
                session.source = request.source;
                if request.action.is_none() {
                    debug!("RCI[{}]: implicit action, kind not yet known", session.id());
                }
            }
            session.closed_group = None;
            session.group = Some(request.group);
            session.group_skip = false;
        }

        let status = dispatch(&mut self.router, &self.config, session, request, response, app, storage)?;
        if status == CallbackStatus::Continue && response.not_available {
            debug!("RCI[{}]: group {} not available, skipping", session.id(), request.group.key.id);
            session.group_skip = true;
            response.skipped = true;
        }
        Ok(settle(request.kind, status, next, Stage::Dispatch))
    }

    fn group_process(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        storage: &mut dyn StoragePort,
        next: Phase,
    ) -> Result<Flow> {
        check_active_group(session, request)?;
        let action = match (session.action, request.action) {
            (Some(current), Some(asked)) if current != asked => {
                return Err(RequestError::OutOfSequence.into());
            }
            (Some(current), _) => current,
            (None, asked) => {
                let action = asked.unwrap_or_default();
                debug!("RCI[{}]: implicit action fixed as {:?}", session.id(), action);
                session.action = Some(action);
                action
            }
        };
        if session.group_skip {
            response.skipped = true;
            return Ok(Flow::Advance(next));
        }

        if let Some(group) = self.catalog.group(request.group.key) {
            let elements = session.list.elements(group)?;
            let element = elements.get(usize::from(request.element)).ok_or(
                InvariantViolation::ElementOutOfRange {
                    group: group.id,
                    element: request.element,
                    count: elements.len(),
                },
            )?;
            match action {
                Action::Set => validate_set(element, request.value.as_ref())?,
                Action::Query if !element.access.can_query() => {
                    response.skipped = true;
                    return Ok(Flow::Advance(next));
                }
                Action::Query => {}
            }
        }

        let status = dispatch(&mut self.router, &self.config, session, request, response, app, storage)?;
        if status == CallbackStatus::Continue && response.not_available {
            response.skipped = true;
        }
        Ok(settle(request.kind, status, next, Stage::Dispatch))
    }

    #[allow(clippy::too_many_arguments)]
    fn group_end(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        storage: &mut dyn StoragePort,
        resume: Option<Stage>,
        next: Phase,
    ) -> Result<Flow> {
        let trailing = session.phase == Phase::Session;
        if trailing {
            if session.closed_group != Some(request.group) {
                return Err(RequestError::OutOfSequence.into());
            }
        } else {
            check_active_group(session, request)?;
        }

        if resume.is_none() && !session.list.is_empty() {
            warn!(
                "RCI[{}]: group-end with {} list level(s) open",
                session.id(),
                session.list.depth()
            );
            self.unwind(session);
        }

        let flow = if session.group_skip {
            response.skipped = true;
            Flow::Advance(next)
        } else {
            let status = dispatch(&mut self.router, &self.config, session, request, response, app, storage)?;
            settle(request.kind, status, next, Stage::Dispatch)
        };

        if let Flow::Advance(_) = flow {
            if trailing {
                session.closed_group = None;
            } else {
                session.group = None;
            }
            session.group_skip = false;
        }
        Ok(flow)
    }

    #[allow(clippy::too_many_arguments)]
    fn list_start(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        storage: &mut dyn StoragePort,
        resume: Option<Stage>,
        next: Phase,
    ) -> Result<Flow> {
        check_active_group(session, request)?;
        let selector = request.list.as_ref().ok_or(RequestError::UnknownCollection)?;
        if session.group_skip {
            response.skipped = true;
            return Ok(Flow::Advance(next));
        }
        let group = self
            .catalog
            .group(request.group.key)
            .ok_or(RequestError::UnknownGroup)?;

        if resume.is_none() {
            let max = self.config.max_list_depth;
            if session.list.depth() >= max {
                return Err(InvariantViolation::DepthExceeded { max }.into());
            }
            session.list.push(group, selector.collection)?;
        }

        if resume != Some(Stage::Lock) {
            let status = dispatch(&mut self.router, &self.config, session, request, response, app, storage)?;
            match settle(request.kind, status, next, Stage::Dispatch) {
                Flow::Advance(_) => {}
                other => return Ok(other),
            }

            if let Some(count) = response.list_count {
                if session.list.is_dynamic(group) {
                    session.list.set_count(group, count)?;
                }
            }
            let index = match &selector.instance {
                InstanceRef::Index(i) => *i,
                InstanceRef::Key(name) => {
                    let (i, known) = session.list.index_of_key(group, name)?;
                    if !known {
                        session.list.register_key(name)?;
                    }
                    i
                }
            };
            let appended = session.list.resolve_instance(group, index)?;
            let name = session.list.current_key_name(group)?.unwrap_or("-");
            debug!(
                "RCI[{}]: collection {} instance {} ({}){}",
                session.id(),
                selector.collection,
                index,
                name,
                if appended { " appended" } else { "" }
            );
        }

        // An undetermined implicit action may still turn into a set.
        if session.action != Some(Action::Query) && session.list.is_dynamic(group) {
            let key = LockKey {
                group: request.group.key,
                index: request.group.index,
                path: session.list.lock_path()?,
            };
            let owner = session.id();
            let level = session
                .list
                .top_mut()
                .ok_or(InvariantViolation::NoActiveLevel)?;
            if let Err(denied) = self.locks.acquire(level, key, owner) {
                debug!("RCI[{}]: list-start waiting: {}", owner, denied);
                return Ok(Flow::Busy(Stage::Lock));
            }
        }
        Ok(Flow::Advance(next))
    }

    fn list_end(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        app: &mut impl AppCallback,
        storage: &mut dyn StoragePort,
        next: Phase,
    ) -> Result<Flow> {
        check_active_group(session, request)?;
        if session.group_skip {
            response.skipped = true;
            return Ok(Flow::Advance(next));
        }
        if self.catalog.group(request.group.key).is_none() {
            return Err(RequestError::UnknownGroup.into());
        }
        let top = session.list.top().ok_or(InvariantViolation::NoActiveLevel)?;
        if let Some(selector) = &request.list {
            if selector.collection != top.collection {
                return Err(RequestError::OutOfSequence.into());
            }
        }

        let status = dispatch(&mut self.router, &self.config, session, request, response, app, storage)?;
        let flow = settle(request.kind, status, next, Stage::Dispatch);
        if let Flow::Advance(_) = flow {
            if let Some(mut level) = session.list.pop() {
                self.locks.release(&mut level);
            }
        }
        Ok(flow)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn on_violation(
        &mut self,
        session: &mut Session,
        request: &Request,
        response: &mut Response,
        violation: InvariantViolation,
    ) -> CallbackStatus {
        self.report_violation(session, violation);
        let truncating = request.kind == RequestKind::ListStart
            && matches!(
                violation,
                InvariantViolation::DepthExceeded { .. } | InvariantViolation::UnresolvedInstance { .. }
            );
        if truncating {
            response.error_hint = Some(Error::from(violation).hint());
            self.teardown(session);
            CallbackStatus::Error
        } else {
            session.pending = None;
            response.skipped = true;
            CallbackStatus::Continue
        }
    }

    /// Pop every level, releasing its lock.
    fn unwind(&mut self, session: &mut Session) {
        while let Some(mut level) = session.list.pop() {
            self.locks.release(&mut level);
        }
    }

    /// Unwind, release every lock the session owns, discard staged records
    /// and close the session. Returns the number of locks released.
    fn teardown(&mut self, session: &mut Session) -> usize {
        let held = self.locks.held_by(session.id());
        self.unwind(session);
        self.locks.release_all(session.id());
        self.router.rollback(session.id());
        session.close();
        held
    }
}

/// Map a handler or application status onto a flow.
fn settle(kind: RequestKind, status: CallbackStatus, next: Phase, stage: Stage) -> Flow {
    match status {
        CallbackStatus::Continue => Flow::Advance(next),
        CallbackStatus::Done => {
            warn!("RCI: done returned for {:?}, treated as continue", kind);
            Flow::Advance(next)
        }
        CallbackStatus::Busy => Flow::Busy(stage),
        CallbackStatus::Error => Flow::Abort,
    }
}

fn check_active_group(session: &Session, request: &Request) -> Result<()> {
    if session.group == Some(request.group) {
        Ok(())
    } else {
        Err(RequestError::OutOfSequence.into())
    }
}

/// Route a group-level transition to its built-in handler, or forward it
/// to the application unchanged.
fn dispatch(
    router: &mut Router,
    config: &EngineConfig,
    session: &Session,
    request: &Request,
    response: &mut Response,
    app: &mut impl AppCallback,
    storage: &mut dyn StoragePort,
) -> Result<CallbackStatus> {
    let Some(handler) = router.route(request.group.key) else {
        return Ok(app.remote_config(request, response));
    };
    let ctx = HandlerContext {
        session: session.id(),
        index: request.group.index,
        source: session.source,
        namespace: &config.storage_namespace,
    };
    match request.kind {
        RequestKind::GroupStart => handler.group_start(&ctx, response),
        RequestKind::GroupEnd => handler.group_end(&ctx, response),
        RequestKind::GroupProcess => match session.action {
            Some(Action::Set) => {
                let value = request.value.as_ref().ok_or(RequestError::TypeMismatch)?;
                handler.set(&ctx, request.element, value)
            }
            Some(Action::Query) | None => handler.query(&ctx, request.element, storage, response),
        },
        // Built-in groups declare no collections; list transitions never
        // reach here past the schema gate.
        RequestKind::ListStart | RequestKind::ListEnd => Ok(CallbackStatus::Continue),
        _ => Ok(app.remote_config(request, response)),
    }
}
