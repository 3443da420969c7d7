//! Log-based application callback adapter.
//!
//! Implements [`AppCallback`] by writing every forwarded transition to the
//! `log` facade and keeping the values set on application-owned groups in
//! memory, so queries read back what an earlier set wrote. A real device
//! application would implement the same trait over its own configuration.

use std::collections::HashMap;

use log::info;

use crate::app::ports::AppCallback;
use crate::rci::request::{Action, CallbackStatus, ElementValue, Request, RequestKind, Response};
use crate::schema::{ElementId, GroupKey};

/// Adapter that logs every forwarded transition.
#[derive(Debug, Default)]
pub struct LoggingApp {
    values: HashMap<(GroupKey, u16, ElementId), ElementValue>,
    transitions: usize,
}

impl LoggingApp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions received so far.
    pub fn transitions(&self) -> usize {
        self.transitions
    }

    pub fn value(&self, key: GroupKey, index: u16, element: ElementId) -> Option<&ElementValue> {
        self.values.get(&(key, index, element))
    }
}

impl AppCallback for LoggingApp {
    fn remote_config(&mut self, request: &Request, response: &mut Response) -> CallbackStatus {
        self.transitions += 1;
        let g = request.group;
        match request.kind {
            RequestKind::GroupProcess => match request.action {
                Some(Action::Set) => {
                    info!(
                        "APP | set {:?}/{}[{}] element {} = {:?}",
                        g.key.kind, g.key.id, g.index, request.element, request.value
                    );
                    if let Some(v) = &request.value {
                        self.values.insert((g.key, g.index, request.element), v.clone());
                    }
                }
                Some(Action::Query) | None => {
                    response.value = self.values.get(&(g.key, g.index, request.element)).cloned();
                    info!(
                        "APP | query {:?}/{}[{}] element {} -> {:?}",
                        g.key.kind, g.key.id, g.index, request.element, response.value
                    );
                }
            },
            RequestKind::GroupStart | RequestKind::GroupEnd => {
                info!("APP | {:?} {:?}/{}[{}]", request.kind, g.key.kind, g.key.id, g.index);
            }
            RequestKind::ListStart | RequestKind::ListEnd => {
                info!("APP | {:?} {:?}", request.kind, request.list);
            }
            kind => {
                info!("APP | {:?} ({:?})", kind, request.action);
            }
        }
        CallbackStatus::Continue
    }
}
