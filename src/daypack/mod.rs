//! Day pack snapshot
//!
//! The outbound model, its content fingerprint and the binary payloads
//! sent to the device.

mod encoder;
mod fingerprint;
mod model;

pub use encoder::*;
pub use fingerprint::*;
pub use model::*;
