//! Kirole Sync - BLE synchronization core for the Kirole e-ink companion
//!
//! Kirole Sync moves app state to the e-ink device and device events back to
//! the app over a constrained BLE link: day pack → fingerprint → sync policy
//! → packetizer → wire → packet assembler, and in reverse, event records →
//! event log codec.
//!
//! ## Modules
//!
//! - **Wire**: CRC16 framing, fragmentation and reassembly
//! - **Events**: device event record decoding
//! - **Day pack**: outbound snapshot, content fingerprint, binary encoding
//! - **Policy / Coordinator**: when to sync, and driving one sync cycle

pub mod checksum;
pub mod config;
pub mod coordinator;
pub mod daypack;
pub mod error;
pub mod events;
pub mod policy;
pub mod wire;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use checksum::crc16;
pub use config::{LinkConfig, SyncConfig, SyncPolicyConfig};
pub use coordinator::{MemoryStateStore, SyncCoordinator, SyncOutcome, SyncStateStore, Transport};
pub use daypack::{DayPack, DeviceMode, Fingerprint, ScreenSize, SettlementData, TaskSummary, WeatherInfo};
pub use error::SyncError;
pub use events::{parse_batch, parse_record, EventLog, EventLogType};
pub use policy::{SyncDecision, SyncPolicy};
pub use wire::{packetize, MessageType, PacketAssembler, ReceivedMessage, WirePacket};

/// Library version reported by the FFI and CLI
pub const SYNC_VERSION: &str = env!("CARGO_PKG_VERSION");
