//! Element value limits and set-value validation.

use serde::{Deserialize, Serialize};

use super::{Element, ElementType};
use crate::error::RequestError;
use crate::rci::request::ElementValue;

/// Optional range restriction declared for an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueLimit {
    Signed { min: i32, max: i32 },
    Unsigned { min: u32, max: u32 },
    Float { min: f32, max: f32 },
    /// Byte length bounds for string-typed elements.
    StringLength { min: usize, max: usize },
    /// Number of enumerators; valid values are `0..count`.
    Enumeration { count: u32 },
}

impl ValueLimit {
    fn admits(&self, value: &ElementValue) -> bool {
        match (self, value) {
            (Self::Signed { min, max }, ElementValue::SignedInteger(v)) => (*min..=*max).contains(v),
            (Self::Unsigned { min, max }, ElementValue::UnsignedInteger(v)) => {
                (*min..=*max).contains(v)
            }
            (Self::Float { min, max }, ElementValue::Float(v)) => (*min..=*max).contains(v),
            (Self::StringLength { min, max }, ElementValue::String(s)) => {
                (*min..=*max).contains(&s.len())
            }
            (Self::Enumeration { count }, ElementValue::Enum(v)) => v < count,
            // A limit of another shape does not constrain this value.
            _ => true,
        }
    }
}

impl ElementType {
    /// Whether `value` carries the variant this element type is encoded as.
    pub fn accepts(self, value: &ElementValue) -> bool {
        matches!(
            (self, value),
            (
                Self::String | Self::MultilineString | Self::Password | Self::Ipv4,
                ElementValue::String(_)
            ) | (Self::Int32, ElementValue::SignedInteger(_))
                | (Self::Uint32 | Self::Hex32, ElementValue::UnsignedInteger(_))
                | (Self::Float, ElementValue::Float(_))
                | (Self::Enum, ElementValue::Enum(_))
                | (Self::OnOff, ElementValue::OnOff(_))
                | (Self::Boolean, ElementValue::Boolean(_))
        )
    }
}

/// Check a remote set value against the element descriptor.
pub(crate) fn validate_set(element: &Element, value: Option<&ElementValue>) -> Result<(), RequestError> {
    if !element.access.can_set() {
        return Err(RequestError::ReadOnly);
    }
    let value = value.ok_or(RequestError::TypeMismatch)?;
    if !element.kind.accepts(value) {
        return Err(RequestError::TypeMismatch);
    }
    match element.limit {
        Some(limit) if !limit.admits(value) => Err(RequestError::OutOfRange),
        _ => Ok(()),
    }
}
