//! Enhanced-services metrics group.
//!
//! A repeated setting group: each instance configures one metrics stream
//! (`path`, `sampling_interval`, `reporting_interval`, seconds). The record
//! also carries runtime next-due timestamps which are never persisted;
//! setting an interval clears its timestamp so the stream is due at once.

use serde::{Deserialize, Serialize};

use super::{Slotted, Staged, read_record, save_record, select_record};
use crate::app::ports::{StorageError, StoragePort};
use crate::error::{InvariantViolation, RequestError, Result};
use crate::rci::request::{CallbackStatus, ElementValue, Response, truncated};
use crate::rci::router::{GroupHandler, HandlerContext};
use crate::rci::session::SessionId;
use crate::schema::{Element, ElementId, ElementType, Group, GroupId, GroupKey, ValueLimit};

pub const ENHANCED_SERVICES: GroupId = 200;
pub const ENHANCED_SERVICES_INSTANCES: usize = 4;
pub const PATH_LEN: usize = 64;

const RECORD_KEY: &str = "enhs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EnhancedServicesElement {
    Path = 0,
    SamplingInterval = 1,
    ReportingInterval = 2,
}

impl EnhancedServicesElement {
    pub const COUNT: usize = 3;

    pub fn from_id(id: ElementId) -> Option<Self> {
        match id {
            0 => Some(Self::Path),
            1 => Some(Self::SamplingInterval),
            2 => Some(Self::ReportingInterval),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub path: heapless::String<PATH_LEN>,
    pub sampling_interval: u32,
    pub reporting_interval: u32,
    #[serde(skip)]
    pub sample_at: u64,
    #[serde(skip)]
    pub report_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancedServicesRecord {
    pub metrics: [MetricsConfig; ENHANCED_SERVICES_INSTANCES],
}

impl Slotted for EnhancedServicesRecord {
    const SLOTS: usize = ENHANCED_SERVICES_INSTANCES;

    /// Config fields come from `from`. Timestamps stay unless the staged
    /// copy cleared them by setting an interval.
    fn copy_slot(&mut self, from: &Self, slot: usize) {
        let (Some(dst), Some(src)) = (self.metrics.get_mut(slot), from.metrics.get(slot)) else {
            return;
        };
        dst.path.clone_from(&src.path);
        dst.sampling_interval = src.sampling_interval;
        dst.reporting_interval = src.reporting_interval;
        if src.sample_at == 0 {
            dst.sample_at = 0;
        }
        if src.report_at == 0 {
            dst.report_at = 0;
        }
    }
}

#[derive(Debug, Default)]
pub struct EnhancedServicesHandler {
    record: Staged<EnhancedServicesRecord>,
}

impl EnhancedServicesHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed configuration of a 1-based group instance.
    pub fn metrics(&self, index: u16) -> Option<&MetricsConfig> {
        slot(index).and_then(|i| self.record.committed().metrics.get(i))
    }

    /// True when instance `index` should sample at `now`; schedules the next one.
    pub fn take_sample_due(&mut self, index: u16, now: u64) -> bool {
        self.take_due(index, now, false)
    }

    /// True when instance `index` should report at `now`; schedules the next one.
    pub fn take_report_due(&mut self, index: u16, now: u64) -> bool {
        self.take_due(index, now, true)
    }

    fn take_due(&mut self, index: u16, now: u64, report: bool) -> bool {
        let mut record = self.record.committed().clone();
        let Some(m) = slot(index).and_then(|i| record.metrics.get_mut(i)) else {
            return false;
        };
        let (interval, at) = if report {
            (m.reporting_interval, &mut m.report_at)
        } else {
            (m.sampling_interval, &mut m.sample_at)
        };
        if interval == 0 || now < *at {
            return false;
        }
        *at = now.saturating_add(u64::from(interval));
        self.record.restore(record);
        true
    }
}

/// 1-based group index to record slot.
fn slot(index: u16) -> Option<usize> {
    let i = usize::from(index).checked_sub(1)?;
    (i < ENHANCED_SERVICES_INSTANCES).then_some(i)
}

impl GroupHandler for EnhancedServicesHandler {
    fn key(&self) -> GroupKey {
        GroupKey::setting(ENHANCED_SERVICES)
    }

    fn descriptor(&self) -> Group {
        Group::new(ENHANCED_SERVICES, "enhanced_services")
            .with_instances(ENHANCED_SERVICES_INSTANCES as u16)
            .with_element(
                Element::new("path", ElementType::String)
                    .with_limit(ValueLimit::StringLength { min: 0, max: PATH_LEN }),
            )
            .with_element(Element::new("sampling_interval", ElementType::Uint32))
            .with_element(Element::new("reporting_interval", ElementType::Uint32))
    }

    fn load(&mut self, storage: &dyn StoragePort, namespace: &str) -> core::result::Result<(), StorageError> {
        if let Some(record) = read_record(storage, namespace, RECORD_KEY)? {
            self.record.restore(record);
        }
        Ok(())
    }

    fn set(&mut self, ctx: &HandlerContext<'_>, element: ElementId, value: &ElementValue) -> Result<CallbackStatus> {
        let id = EnhancedServicesElement::from_id(element).ok_or(InvariantViolation::HandlerDrift {
            group: ENHANCED_SERVICES,
            element,
        })?;
        let i = slot(ctx.index).ok_or(RequestError::InvalidIndex)?;
        let m = &mut self.record.stage(ctx.session, i).metrics[i];

        match id {
            EnhancedServicesElement::Path => {
                let path = value.as_str().ok_or(RequestError::TypeMismatch)?;
                m.path = truncated(path);
            }
            EnhancedServicesElement::SamplingInterval => {
                m.sampling_interval = value.as_unsigned().ok_or(RequestError::TypeMismatch)?;
                m.sample_at = 0;
            }
            EnhancedServicesElement::ReportingInterval => {
                m.reporting_interval = value.as_unsigned().ok_or(RequestError::TypeMismatch)?;
                m.report_at = 0;
            }
        }
        Ok(CallbackStatus::Continue)
    }

    fn query(
        &mut self,
        ctx: &HandlerContext<'_>,
        element: ElementId,
        storage: &dyn StoragePort,
        response: &mut Response,
    ) -> Result<CallbackStatus> {
        let id = EnhancedServicesElement::from_id(element).ok_or(InvariantViolation::HandlerDrift {
            group: ENHANCED_SERVICES,
            element,
        })?;
        let i = slot(ctx.index).ok_or(RequestError::InvalidIndex)?;
        let record = select_record(&self.record, ctx.session, ctx.source, storage, ctx.namespace, RECORD_KEY)?;
        let m = &record.metrics[i];

        response.value = Some(match id {
            EnhancedServicesElement::Path => ElementValue::string(&m.path),
            EnhancedServicesElement::SamplingInterval => ElementValue::UnsignedInteger(m.sampling_interval),
            EnhancedServicesElement::ReportingInterval => ElementValue::UnsignedInteger(m.reporting_interval),
        });
        Ok(CallbackStatus::Continue)
    }

    fn commit(
        &mut self,
        owner: SessionId,
        storage: &mut dyn StoragePort,
        namespace: &str,
    ) -> core::result::Result<bool, StorageError> {
        self.record
            .commit_with(owner, |r| save_record(storage, namespace, RECORD_KEY, r))
    }

    fn rollback(&mut self, owner: SessionId) {
        self.record.rollback(owner);
    }
}
