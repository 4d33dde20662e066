//! Inbound reassembly
//!
//! The assembler collects fragments per message id, in any order and
//! interleaved across ids, and hands back the payload exactly once when the
//! last missing index arrives.
//!
//! Rules applied to every fragment:
//! - Fragments that fail to decode (short, bad checksum, bad index) are dropped.
//! - A `total_fragments` (or message type) that disagrees with the partial
//!   state for the same id restarts collection from this fragment.
//! - Every valid fragment is collected. When a message completes, it is
//!   compared whole against the last delivery under the same id; an identical
//!   repeat is swallowed, so a message is never delivered twice.
//! - A lone late duplicate of a multi-fragment message cannot complete and
//!   stays pending until [`PacketAssembler::discard`] or
//!   [`PacketAssembler::reset`].

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::packet::{MessageType, WirePacket};

/// Completed messages remembered for duplicate suppression.
pub const DEFAULT_COMPLETED_HISTORY: usize = 16;

/// A fully reassembled message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub message_type: u8,
    pub message_id: u16,
    pub payload: Vec<u8>,
}

impl ReceivedMessage {
    /// The known message kind, if the type byte is one the app understands.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_byte(self.message_type)
    }
}

struct Chunk {
    checksum: u16,
    bytes: Vec<u8>,
}

struct Assembly {
    message_type: u8,
    total: u16,
    chunks: BTreeMap<u16, Chunk>,
}

impl Assembly {
    fn new(message_type: u8, total: u16) -> Self {
        Self {
            message_type,
            total,
            chunks: BTreeMap::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.chunks.len() == self.total as usize
    }
}

/// Fingerprint of a delivered message: one checksum per fragment index.
struct Completed {
    message_id: u16,
    message_type: u8,
    checksums: Vec<u16>,
}

impl Completed {
    fn matches(&self, other: &Completed) -> bool {
        self.message_id == other.message_id
            && self.message_type == other.message_type
            && self.checksums == other.checksums
    }
}

struct AssemblerState {
    in_flight: HashMap<u16, Assembly>,
    completed: VecDeque<Completed>,
    history: usize,
}

impl AssemblerState {
    fn accept(&mut self, packet: WirePacket) -> Option<ReceivedMessage> {
        let id = packet.message_id;

        let conflicting = self.in_flight.get(&id).is_some_and(|assembly| {
            assembly.total != packet.total_fragments || assembly.message_type != packet.message_type
        });
        if conflicting {
            warn!(
                "message {id:#06x} changed shape mid-transfer (now {} fragments, type {:#04x}); restarting",
                packet.total_fragments, packet.message_type
            );
            self.in_flight.remove(&id);
        }

        let assembly = self
            .in_flight
            .entry(id)
            .or_insert_with(|| Assembly::new(packet.message_type, packet.total_fragments));
        assembly.chunks.insert(
            packet.sequence_index,
            Chunk {
                checksum: packet.checksum,
                bytes: packet.payload_chunk,
            },
        );

        if !assembly.is_complete() {
            return None;
        }

        let assembly = self.in_flight.remove(&id)?;
        let completed = Completed {
            message_id: id,
            message_type: assembly.message_type,
            checksums: assembly.chunks.values().map(|c| c.checksum).collect(),
        };
        if !self.remember(completed) {
            debug!("ignoring repeat of delivered message {id:#06x}");
            return None;
        }

        let payload: Vec<u8> = assembly
            .chunks
            .into_values()
            .flat_map(|chunk| chunk.bytes)
            .collect();

        debug!(
            "reassembled message {id:#06x} type {:#04x} ({} bytes)",
            assembly.message_type,
            payload.len()
        );

        Some(ReceivedMessage {
            message_type: assembly.message_type,
            message_id: id,
            payload,
        })
    }

    /// Record a completed message. Returns false if it repeats the last
    /// delivery under the same id.
    fn remember(&mut self, completed: Completed) -> bool {
        if self.history == 0 {
            return true;
        }
        if let Some(pos) = self.completed.iter().position(|c| c.message_id == completed.message_id) {
            if self.completed[pos].matches(&completed) {
                return false;
            }
            // Same id, different content: the sender has moved on.
            self.completed.remove(pos);
        }
        self.completed.push_back(completed);
        while self.completed.len() > self.history {
            self.completed.pop_front();
        }
        true
    }
}

/// Reassembles fragments delivered by the transport.
///
/// All methods take `&self`; the fragment table sits behind a mutex so the
/// radio callback and foreground queries can share one instance.
pub struct PacketAssembler {
    state: Mutex<AssemblerState>,
}

impl Default for PacketAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketAssembler {
    /// Create an assembler with the default completed-message history
    pub fn new() -> Self {
        Self::with_history(DEFAULT_COMPLETED_HISTORY)
    }

    /// Create an assembler remembering `history` delivered messages
    /// (0 disables duplicate suppression)
    pub fn with_history(history: usize) -> Self {
        Self {
            state: Mutex::new(AssemblerState {
                in_flight: HashMap::new(),
                completed: VecDeque::with_capacity(history),
                history,
            }),
        }
    }

    /// Feed one raw packet. Returns the message only on the call that
    /// completes it.
    pub fn append(&self, packet_data: &[u8]) -> Option<ReceivedMessage> {
        let packet = match WirePacket::decode(packet_data) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("dropping fragment: {err}");
                return None;
            }
        };

        self.lock().accept(packet)
    }

    /// Message ids with partial state, ascending.
    pub fn pending_messages(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.lock().in_flight.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Drop the partial state of one message. Returns whether anything was held.
    pub fn discard(&self, message_id: u16) -> bool {
        self.lock().in_flight.remove(&message_id).is_some()
    }

    /// Forget everything, e.g. on disconnect.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.in_flight.clear();
        state.completed.clear();
    }

    fn lock(&self) -> MutexGuard<'_, AssemblerState> {
        // Chunks are inserted and removed whole; a poisoned table is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::packetizer::packetize_bytes;
    use pretty_assertions::assert_eq;

    fn feed_all(assembler: &PacketAssembler, packets: &[Vec<u8>]) -> Vec<ReceivedMessage> {
        packets.iter().filter_map(|p| assembler.append(p)).collect()
    }

    #[test]
    fn test_in_order_round_trip() {
        let payload: Vec<u8> = (0..50).collect();
        let packets = packetize_bytes(0x10, 0x1234, &payload, 8).unwrap();

        let assembler = PacketAssembler::new();
        let messages = feed_all(&assembler, &packets);

        assert_eq!(
            messages,
            vec![ReceivedMessage {
                message_type: 0x10,
                message_id: 0x1234,
                payload,
            }]
        );
        assert!(assembler.pending_messages().is_empty());
    }

    #[test]
    fn test_only_final_fragment_returns_message() {
        let packets = packetize_bytes(0x10, 1, b"abcdefghij", 3).unwrap();
        let assembler = PacketAssembler::new();

        assert!(assembler.append(&packets[3]).is_none());
        assert!(assembler.append(&packets[0]).is_none());
        assert!(assembler.append(&packets[2]).is_none());
        let message = assembler.append(&packets[1]).unwrap();
        assert_eq!(message.payload, b"abcdefghij");
    }

    #[test]
    fn test_interleaved_messages() {
        let a = packetize_bytes(0x10, 1, b"first message body", 5).unwrap();
        let b = packetize_bytes(0x21, 2, b"second", 2).unwrap();
        let assembler = PacketAssembler::new();

        let mut delivered = Vec::new();
        for i in 0..a.len().max(b.len()) {
            if let Some(p) = b.get(i) {
                delivered.extend(assembler.append(p));
            }
            if let Some(p) = a.get(i) {
                delivered.extend(assembler.append(p));
            }
        }

        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].message_id, 2);
        assert_eq!(delivered[0].payload, b"second");
        assert_eq!(delivered[1].message_id, 1);
        assert_eq!(delivered[1].payload, b"first message body");
    }

    #[test]
    fn test_rejects_packet_shorter_than_header() {
        let assembler = PacketAssembler::new();
        assert!(assembler.append(&[0x01, 0x02, 0x03]).is_none());
        assert!(assembler.pending_messages().is_empty());
    }

    #[test]
    fn test_corrupt_fragment_dropped_until_resend() {
        let packets = packetize_bytes(0x10, 5, b"0123456789", 4).unwrap();
        let assembler = PacketAssembler::new();

        let mut corrupt = packets[1].clone();
        corrupt[10] ^= 0x40;

        assert!(assembler.append(&packets[0]).is_none());
        assert!(assembler.append(&corrupt).is_none());
        assert!(assembler.append(&packets[2]).is_none());
        assert_eq!(assembler.pending_messages(), vec![5]);

        let message = assembler.append(&packets[1]).unwrap();
        assert_eq!(message.payload, b"0123456789");
    }

    #[test]
    fn test_total_conflict_restarts_collection() {
        let old = packetize_bytes(0x10, 9, b"old payload here", 4).unwrap();
        let new = packetize_bytes(0x10, 9, b"new!", 2).unwrap();
        let assembler = PacketAssembler::new();

        assert!(assembler.append(&old[0]).is_none());
        assert!(assembler.append(&old[1]).is_none());

        // Device rebooted and re-sent id 9 with two fragments.
        assert!(assembler.append(&new[0]).is_none());
        // A stale four-fragment piece now conflicts again and wins.
        assert!(assembler.append(&old[2]).is_none());
        assert!(assembler.append(&new[0]).is_none());
        let message = assembler.append(&new[1]).unwrap();
        assert_eq!(message.payload, b"new!");
    }

    #[test]
    fn test_late_duplicate_is_ignored() {
        let packets = packetize_bytes(0x21, 3, b"events", 17).unwrap();
        let assembler = PacketAssembler::new();

        assert!(assembler.append(&packets[0]).is_some());
        assert!(assembler.append(&packets[0]).is_none());
        assert!(assembler.pending_messages().is_empty());
    }

    #[test]
    fn test_reused_id_with_new_content_is_delivered() {
        let first = packetize_bytes(0x21, 3, b"events", 17).unwrap();
        let second = packetize_bytes(0x21, 3, b"more events", 17).unwrap();
        let assembler = PacketAssembler::new();

        assert!(assembler.append(&first[0]).is_some());
        let message = assembler.append(&second[0]).unwrap();
        assert_eq!(message.payload, b"more events");
    }

    #[test]
    fn test_reused_id_with_shared_first_chunk_is_delivered() {
        let old = packetize_bytes(0x21, 0, b"HEADER01-old-tail", 8).unwrap();
        let new = packetize_bytes(0x21, 0, b"HEADER01-new-tail", 8).unwrap();
        assert_eq!(old[0], new[0]);
        let assembler = PacketAssembler::new();

        assert_eq!(feed_all(&assembler, &old).len(), 1);
        let messages = feed_all(&assembler, &new);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, b"HEADER01-new-tail");
        assert!(assembler.pending_messages().is_empty());
    }

    #[test]
    fn test_full_resend_of_delivered_message_is_swallowed() {
        let packets = packetize_bytes(0x10, 4, b"day pack contents", 5).unwrap();
        let assembler = PacketAssembler::new();

        assert_eq!(feed_all(&assembler, &packets).len(), 1);
        assert!(feed_all(&assembler, &packets).is_empty());
        assert!(assembler.pending_messages().is_empty());

        // A lone stale fragment waits for the rest.
        assert!(assembler.append(&packets[1]).is_none());
        assert_eq!(assembler.pending_messages(), vec![4]);
        assert!(assembler.discard(4));
    }

    #[test]
    fn test_zero_history_delivers_repeats() {
        let packets = packetize_bytes(0x21, 3, b"x", 17).unwrap();
        let assembler = PacketAssembler::with_history(0);

        assert!(assembler.append(&packets[0]).is_some());
        assert!(assembler.append(&packets[0]).is_some());
    }

    #[test]
    fn test_discard_and_reset() {
        let a = packetize_bytes(0x10, 1, b"aaaaaaaa", 2).unwrap();
        let b = packetize_bytes(0x10, 2, b"bbbbbbbb", 2).unwrap();
        let assembler = PacketAssembler::new();

        assembler.append(&a[0]);
        assembler.append(&b[0]);
        assert_eq!(assembler.pending_messages(), vec![1, 2]);

        assert!(assembler.discard(1));
        assert!(!assembler.discard(1));
        assert_eq!(assembler.pending_messages(), vec![2]);

        assembler.reset();
        assert!(assembler.pending_messages().is_empty());
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let packets = packetize_bytes(0x20, 0, &[], 17).unwrap();
        let assembler = PacketAssembler::new();
        let message = assembler.append(&packets[0]).unwrap();
        assert!(message.payload.is_empty());
        assert_eq!(message.kind(), Some(MessageType::EventLogRequest));
    }

    #[test]
    fn test_concurrent_appends_share_one_table() {
        use std::sync::Arc;
        use std::thread;

        let payload: Vec<u8> = (0..=255).collect();
        let packets = packetize_bytes(0x10, 77, &payload, 4).unwrap();
        let assembler = Arc::new(PacketAssembler::new());

        let handles: Vec<_> = packets
            .chunks(16)
            .map(|batch| {
                let batch = batch.to_vec();
                let assembler = Arc::clone(&assembler);
                thread::spawn(move || {
                    batch
                        .iter()
                        .filter_map(|p| assembler.append(p))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let delivered: Vec<ReceivedMessage> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload, payload);
    }
}
