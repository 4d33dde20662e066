//! Device event logs
//!
//! Decoding of the fixed-width records the device pushes back after a sync.

mod codec;
mod types;

pub use codec::*;
pub use types::*;
