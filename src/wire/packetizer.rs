//! Outbound fragmentation
//!
//! Splits one logical message into checksummed [`WirePacket`]s no larger than
//! the negotiated chunk size.

use crate::error::SyncError;

use super::packet::WirePacket;

/// Upper bound on fragments per message, set by the u16 `total_fragments` field.
pub const MAX_FRAGMENTS: usize = u16::MAX as usize;

/// Split `payload` into fragments of at most `max_chunk_size` bytes.
///
/// An empty payload still yields one (empty) fragment so the receiver always
/// sees the message.
pub fn packetize(
    message_type: u8,
    message_id: u16,
    payload: &[u8],
    max_chunk_size: usize,
) -> Result<Vec<WirePacket>, SyncError> {
    if max_chunk_size == 0 {
        return Err(SyncError::InvalidChunkSize);
    }

    let total = payload.len().div_ceil(max_chunk_size).max(1);
    if total > MAX_FRAGMENTS {
        return Err(SyncError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_FRAGMENTS,
        });
    }
    let total = total as u16;

    if payload.is_empty() {
        return Ok(vec![WirePacket::new(message_type, message_id, 0, 1, Vec::new())]);
    }

    let packets = payload
        .chunks(max_chunk_size)
        .enumerate()
        .map(|(index, chunk)| {
            WirePacket::new(message_type, message_id, index as u16, total, chunk.to_vec())
        })
        .collect();

    Ok(packets)
}

/// Same as [`packetize`] but returns the encoded byte buffers ready for a
/// characteristic write.
pub fn packetize_bytes(
    message_type: u8,
    message_id: u16,
    payload: &[u8],
    max_chunk_size: usize,
) -> Result<Vec<Vec<u8>>, SyncError> {
    Ok(packetize(message_type, message_id, payload, max_chunk_size)?
        .iter()
        .map(WirePacket::encode)
        .collect())
}

/// Wrapping per-session message id counter
#[derive(Debug, Clone, Default)]
pub struct MessageIdSequence {
    next: u16,
}

impl MessageIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from a specific id (e.g. restored from a previous session).
    pub fn starting_at(next: u16) -> Self {
        Self { next }
    }

    /// Hand out the next id.
    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}
