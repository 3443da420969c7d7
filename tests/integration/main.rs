//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the engine through complete
//! sessions against the mock application callback and the in-memory NVS
//! adapter. All tests run on the host with no device required.

mod busy_cancel_tests;
mod list_tests;
mod mock_app;
