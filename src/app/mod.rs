//! Application boundary.
//!
//! The engine never owns the device application or its storage medium.
//! Both are reached through the **port traits** defined in [`ports`], so
//! every layer above them is testable with mocks.

pub mod ports;
