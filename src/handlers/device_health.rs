//! Device-health simple metrics group.
//!
//! One non-repeated group with three switches and two rates per metric
//! class. Element ids run class by class: `eth`, `mobile`, `sys`, each as
//! `{metrics, sample_rate, report_rate}`.

use serde::{Deserialize, Serialize};

use super::{Slotted, Staged, read_record, save_record, select_record};
use crate::app::ports::{StorageError, StoragePort};
use crate::error::{InvariantViolation, RequestError, Result};
use crate::rci::request::{CallbackStatus, ElementValue, OnOff, Response};
use crate::rci::router::{GroupHandler, HandlerContext};
use crate::rci::session::SessionId;
use crate::schema::{Element, ElementId, ElementType, Group, GroupId, GroupKey};

pub const DEVICE_HEALTH: GroupId = 201;

const RECORD_KEY: &str = "devh";
const FIELDS_PER_CLASS: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricClass {
    Eth,
    Mobile,
    Sys,
}

impl MetricClass {
    pub const ALL: [Self; 3] = [Self::Eth, Self::Mobile, Self::Sys];

    fn name(self) -> &'static str {
        match self {
            Self::Eth => "eth",
            Self::Mobile => "mobile",
            Self::Sys => "sys",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    Metrics,
    SampleRate,
    ReportRate,
}

/// Decoded element id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHealthElement {
    pub class: MetricClass,
    pub field: MetricField,
}

impl DeviceHealthElement {
    pub const COUNT: usize = MetricClass::ALL.len() * FIELDS_PER_CLASS as usize;

    pub fn from_id(id: ElementId) -> Option<Self> {
        let class = *MetricClass::ALL.get(usize::from(id / FIELDS_PER_CLASS))?;
        let field = match id % FIELDS_PER_CLASS {
            0 => MetricField::Metrics,
            1 => MetricField::SampleRate,
            _ => MetricField::ReportRate,
        };
        Some(Self { class, field })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleMetric {
    pub metrics: OnOff,
    pub sample_rate: u32,
    pub report_rate: u32,
}

impl Default for SimpleMetric {
    fn default() -> Self {
        Self {
            metrics: OnOff::Off,
            sample_rate: 0,
            report_rate: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHealthRecord {
    pub eth: SimpleMetric,
    pub mobile: SimpleMetric,
    pub sys: SimpleMetric,
}

impl DeviceHealthRecord {
    pub fn class(&self, class: MetricClass) -> &SimpleMetric {
        match class {
            MetricClass::Eth => &self.eth,
            MetricClass::Mobile => &self.mobile,
            MetricClass::Sys => &self.sys,
        }
    }

    fn class_mut(&mut self, class: MetricClass) -> &mut SimpleMetric {
        match class {
            MetricClass::Eth => &mut self.eth,
            MetricClass::Mobile => &mut self.mobile,
            MetricClass::Sys => &mut self.sys,
        }
    }
}

/// One slot per metric class.
impl Slotted for DeviceHealthRecord {
    const SLOTS: usize = MetricClass::ALL.len();

    fn copy_slot(&mut self, from: &Self, slot: usize) {
        if let Some(&class) = MetricClass::ALL.get(slot) {
            *self.class_mut(class) = *from.class(class);
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceHealthHandler {
    record: Staged<DeviceHealthRecord>,
}

impl DeviceHealthHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &DeviceHealthRecord {
        self.record.committed()
    }
}

fn drift(element: ElementId) -> InvariantViolation {
    InvariantViolation::HandlerDrift {
        group: DEVICE_HEALTH,
        element,
    }
}

impl GroupHandler for DeviceHealthHandler {
    fn key(&self) -> GroupKey {
        GroupKey::setting(DEVICE_HEALTH)
    }

    fn descriptor(&self) -> Group {
        MetricClass::ALL
            .iter()
            .fold(Group::new(DEVICE_HEALTH, "simple_enhanced_services"), |g, class| {
                let n = class.name();
                g.with_element(Element::new(&format!("{n}_metrics"), ElementType::OnOff))
                    .with_element(Element::new(&format!("{n}_sample_rate"), ElementType::Uint32))
                    .with_element(Element::new(&format!("{n}_report_rate"), ElementType::Uint32))
            })
    }

    fn load(&mut self, storage: &dyn StoragePort, namespace: &str) -> core::result::Result<(), StorageError> {
        if let Some(record) = read_record(storage, namespace, RECORD_KEY)? {
            self.record.restore(record);
        }
        Ok(())
    }

    fn set(&mut self, ctx: &HandlerContext<'_>, element: ElementId, value: &ElementValue) -> Result<CallbackStatus> {
        let id = DeviceHealthElement::from_id(element).ok_or(drift(element))?;
        let metric = self.record.stage(ctx.session, id.class as usize).class_mut(id.class);

        match id.field {
            MetricField::Metrics => {
                metric.metrics = value.as_on_off().ok_or(RequestError::TypeMismatch)?;
            }
            MetricField::SampleRate => {
                metric.sample_rate = value.as_unsigned().ok_or(RequestError::TypeMismatch)?;
            }
            MetricField::ReportRate => {
                metric.report_rate = value.as_unsigned().ok_or(RequestError::TypeMismatch)?;
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
        let id = DeviceHealthElement::from_id(element).ok_or(drift(element))?;
        let record = select_record(&self.record, ctx.session, ctx.source, storage, ctx.namespace, RECORD_KEY)?;
        let metric = record.class(id.class);

        response.value = Some(match id.field {
            MetricField::Metrics => ElementValue::OnOff(metric.metrics),
            MetricField::SampleRate => ElementValue::UnsignedInteger(metric.sample_rate),
            MetricField::ReportRate => ElementValue::UnsignedInteger(metric.report_rate),
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
