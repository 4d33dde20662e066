//! BLE wire protocol
//!
//! Outbound messages are split by the [`packetizer`] into checksummed
//! [`WirePacket`]s; inbound packets are stitched back together by the
//! [`PacketAssembler`].

mod assembler;
mod packet;
mod packetizer;

pub use assembler::*;
pub use packet::*;
pub use packetizer::*;
