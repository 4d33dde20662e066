//! Wire packet layout
//!
//! ```text
//! byte 0     : message type
//! bytes 1-2  : message id          (BE u16)
//! bytes 3-4  : sequence index      (BE u16)
//! bytes 5-6  : total fragments     (BE u16)
//! bytes 7-8  : CRC16 of every other byte in the packet (BE u16)
//! bytes 9..N : payload chunk
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checksum::crc16_parts;

/// Fixed header length preceding every payload chunk.
pub const HEADER_SIZE: usize = 9;

/// Chunk size that fits a BLE 4.2 ATT write (20 bytes minus the 3-byte ATT header).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 17;

const CHECKSUM_OFFSET: usize = 7;

/// Application-level message kinds understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    PetStatus,
    TaskList,
    Schedule,
    Weather,
    Time,
    DayPack,
    TaskInPage,
    DeviceMode,
    EventLogRequest,
    EventLogBatch,
}

impl MessageType {
    pub fn as_byte(self) -> u8 {
        match self {
            MessageType::PetStatus => 0x01,
            MessageType::TaskList => 0x02,
            MessageType::Schedule => 0x03,
            MessageType::Weather => 0x04,
            MessageType::Time => 0x05,
            MessageType::DayPack => 0x10,
            MessageType::TaskInPage => 0x11,
            MessageType::DeviceMode => 0x12,
            MessageType::EventLogRequest => 0x20,
            MessageType::EventLogBatch => 0x21,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(MessageType::PetStatus),
            0x02 => Some(MessageType::TaskList),
            0x03 => Some(MessageType::Schedule),
            0x04 => Some(MessageType::Weather),
            0x05 => Some(MessageType::Time),
            0x10 => Some(MessageType::DayPack),
            0x11 => Some(MessageType::TaskInPage),
            0x12 => Some(MessageType::DeviceMode),
            0x20 => Some(MessageType::EventLogRequest),
            0x21 => Some(MessageType::EventLogBatch),
            _ => None,
        }
    }
}

/// Reasons a single fragment is rejected on receipt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet too short: {len} bytes, header needs {HEADER_SIZE}")]
    TooShort { len: usize },

    #[error("checksum mismatch: packet carries {expected:#06x}, computed {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("sequence index {index} out of range for {total} fragments")]
    InvalidSequence { index: u16, total: u16 },
}

/// One fragment of a logical message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePacket {
    pub message_type: u8,
    pub message_id: u16,
    pub sequence_index: u16,
    pub total_fragments: u16,
    pub payload_chunk: Vec<u8>,
    pub checksum: u16,
}

impl WirePacket {
    /// Build a fragment and compute its checksum.
    pub fn new(
        message_type: u8,
        message_id: u16,
        sequence_index: u16,
        total_fragments: u16,
        payload_chunk: Vec<u8>,
    ) -> Self {
        let mut packet = WirePacket {
            message_type,
            message_id,
            sequence_index,
            total_fragments,
            payload_chunk,
            checksum: 0,
        };
        packet.checksum = packet.compute_checksum();
        packet
    }

    /// CRC16 over the header fields and the chunk, skipping the checksum slot.
    pub fn compute_checksum(&self) -> u16 {
        crc16_parts(&[&self.header_fields()[..], &self.payload_chunk[..]])
    }

    /// Whether the stored checksum matches the content.
    pub fn is_valid(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Serialize to the on-air byte layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload_chunk.len());
        out.extend_from_slice(&self.header_fields());
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&self.payload_chunk);
        out
    }

    /// Parse and verify a received buffer.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < HEADER_SIZE {
            return Err(PacketError::TooShort { len: data.len() });
        }

        let expected = u16::from_be_bytes([data[CHECKSUM_OFFSET], data[CHECKSUM_OFFSET + 1]]);
        let actual = crc16_parts(&[&data[..CHECKSUM_OFFSET], &data[HEADER_SIZE..]]);
        if expected != actual {
            return Err(PacketError::ChecksumMismatch { expected, actual });
        }

        let sequence_index = u16::from_be_bytes([data[3], data[4]]);
        let total_fragments = u16::from_be_bytes([data[5], data[6]]);
        if total_fragments == 0 || sequence_index >= total_fragments {
            return Err(PacketError::InvalidSequence {
                index: sequence_index,
                total: total_fragments,
            });
        }

        Ok(WirePacket {
            message_type: data[0],
            message_id: u16::from_be_bytes([data[1], data[2]]),
            sequence_index,
            total_fragments,
            payload_chunk: data[HEADER_SIZE..].to_vec(),
            checksum: expected,
        })
    }

    fn header_fields(&self) -> [u8; CHECKSUM_OFFSET] {
        let id = self.message_id.to_be_bytes();
        let seq = self.sequence_index.to_be_bytes();
        let total = self.total_fragments.to_be_bytes();
        [
            self.message_type,
            id[0],
            id[1],
            seq[0],
            seq[1],
            total[0],
            total[1],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::crc16;

    #[test]
    fn test_header_layout_is_big_endian() {
        let packet = WirePacket::new(0x10, 0x1234, 0x0002, 0x0005, vec![0xAA, 0xBB]);
        let bytes = packet.encode();

        assert_eq!(bytes.len(), HEADER_SIZE + 2);
        assert_eq!(&bytes[..7], &[0x10, 0x12, 0x34, 0x00, 0x02, 0x00, 0x05]);
        assert_eq!(u16::from_be_bytes([bytes[7], bytes[8]]), packet.checksum);
        assert_eq!(&bytes[9..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_checksum_skips_its_own_field() {
        let packet = WirePacket::new(0x21, 7, 0, 1, b"abc".to_vec());
        let bytes = packet.encode();

        let mut covered = bytes[..7].to_vec();
        covered.extend_from_slice(&bytes[9..]);
        assert_eq!(crc16(&covered), packet.checksum);
    }

    #[test]
    fn test_decode_accepts_encoded_packet() {
        let packet = WirePacket::new(0x05, 42, 1, 3, vec![1, 2, 3, 4]);
        let decoded = WirePacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.is_valid());
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert_eq!(
            WirePacket::decode(&[0x01, 0x02, 0x03]),
            Err(PacketError::TooShort { len: 3 })
        );
    }

    #[test]
    fn test_decode_rejects_corrupted_chunk() {
        let mut bytes = WirePacket::new(0x10, 1, 0, 1, vec![9, 9, 9]).encode();
        bytes[10] ^= 0xFF;
        assert!(matches!(
            WirePacket::decode(&bytes),
            Err(PacketError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_out_of_range_index() {
        let bytes = WirePacket::new(0x10, 1, 3, 3, vec![]).encode();
        assert_eq!(
            WirePacket::decode(&bytes),
            Err(PacketError::InvalidSequence { index: 3, total: 3 })
        );

        let bytes = WirePacket::new(0x10, 1, 0, 0, vec![]).encode();
        assert!(matches!(
            WirePacket::decode(&bytes),
            Err(PacketError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn test_message_type_bytes() {
        for kind in [
            MessageType::PetStatus,
            MessageType::TaskList,
            MessageType::Schedule,
            MessageType::Weather,
            MessageType::Time,
            MessageType::DayPack,
            MessageType::TaskInPage,
            MessageType::DeviceMode,
            MessageType::EventLogRequest,
            MessageType::EventLogBatch,
        ] {
            assert_eq!(MessageType::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(MessageType::DayPack.as_byte(), 0x10);
        assert_eq!(MessageType::EventLogBatch.as_byte(), 0x21);
        assert_eq!(MessageType::from_byte(0xEE), None);
    }
}
