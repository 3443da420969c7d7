//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements   | Connects to                   |
//! |------------|--------------|-------------------------------|
//! | `log_sink` | AppCallback  | Serial log + in-memory values |
//! | `nvs`      | StoragePort  | In-memory NVS simulation      |

pub mod log_sink;
pub mod nvs;
