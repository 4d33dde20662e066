//! Property tests for framing, reassembly and fingerprinting.

use chrono::NaiveDate;
use kirole_sync::wire::{packetize, PacketAssembler, HEADER_SIZE};
use kirole_sync::{DayPack, SettlementData, TaskSummary};
use proptest::prelude::*;

/// Payload plus a chunk size, with the fragments in a random delivery order.
fn shuffled_packets() -> impl Strategy<Value = (Vec<u8>, u8, Vec<Vec<u8>>)> {
    (proptest::collection::vec(any::<u8>(), 0..300), 1usize..40, any::<u8>()).prop_flat_map(
        |(payload, chunk_size, message_type)| {
            let packets: Vec<Vec<u8>> = packetize(message_type, 77, &payload, chunk_size)
                .unwrap()
                .iter()
                .map(|p| p.encode())
                .collect();
            (Just(payload), Just(message_type), Just(packets).prop_shuffle())
        },
    )
}

fn pack_from(texts: &[String; 5], task_titles: &[String], points: u32) -> DayPack {
    DayPack::new(
        NaiveDate::from_ymd_opt(2026, 2, 4).unwrap(),
        texts[0].clone(),
        texts[1].clone(),
        texts[2].clone(),
        texts[3].clone(),
    )
    .with_schedule_summary(texts[4].clone())
    .with_tasks(
        task_titles
            .iter()
            .enumerate()
            .map(|(i, title)| TaskSummary::new(format!("task-{}", i), title.clone()))
            .collect(),
    )
    .with_settlement(SettlementData {
        points_earned: points,
        ..SettlementData::default()
    })
}

proptest! {
    /// Any delivery order reassembles the original payload exactly once,
    /// on the call that supplies the last fragment.
    #[test]
    fn reassembles_in_any_order((payload, message_type, packets) in shuffled_packets()) {
        let assembler = PacketAssembler::new();
        let last = packets.len() - 1;

        for (i, packet) in packets.iter().enumerate() {
            let result = assembler.append(packet);
            if i < last {
                prop_assert!(result.is_none());
            } else {
                let message = result.expect("last fragment completes the message");
                prop_assert_eq!(&message.payload, &payload);
                prop_assert_eq!(message.message_type, message_type);
                prop_assert_eq!(message.message_id, 77);
            }
        }

        // Late duplicates never deliver twice.
        for packet in &packets {
            prop_assert!(assembler.append(packet).is_none());
        }
    }

    /// A single corrupted byte in a chunk blocks delivery until a clean resend.
    #[test]
    fn corrupted_chunk_is_never_delivered(
        payload in proptest::collection::vec(any::<u8>(), 1..200),
        chunk_size in 1usize..32,
        which in any::<prop::sample::Index>(),
        offset in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let packets: Vec<Vec<u8>> = packetize(0x10, 5, &payload, chunk_size)
            .unwrap()
            .iter()
            .map(|p| p.encode())
            .collect();
        let target = which.index(packets.len());
        let mut corrupted = packets[target].clone();
        let chunk_len = corrupted.len() - HEADER_SIZE;
        corrupted[HEADER_SIZE + offset.index(chunk_len)] ^= flip;

        let assembler = PacketAssembler::new();
        prop_assert!(assembler.append(&corrupted).is_none());
        for (i, packet) in packets.iter().enumerate() {
            if i != target {
                prop_assert!(assembler.append(packet).is_none());
            }
        }

        let message = assembler.append(&packets[target]);
        prop_assert_eq!(message.map(|m| m.payload), Some(payload));
    }

    /// Equal content hashes equally; a different companion phrase does not.
    #[test]
    fn fingerprint_tracks_content(
        texts in prop::array::uniform5(".{0,20}"),
        titles in proptest::collection::vec(".{0,12}", 0..5),
        points in any::<u32>(),
        other_phrase in ".{0,20}",
    ) {
        let a = pack_from(&texts, &titles, points);
        let b = pack_from(&texts, &titles, points);
        prop_assert_eq!(a.stable_fingerprint(), b.stable_fingerprint());

        prop_assume!(other_phrase != texts[3]);
        let mut c = pack_from(&texts, &titles, points);
        c.companion_phrase = other_phrase;
        prop_assert_ne!(a.stable_fingerprint(), c.stable_fingerprint());
    }
}
