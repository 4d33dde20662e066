//! End-to-end sync cycles through the public API, with a simulated device
//! on the other side of the transport.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use pretty_assertions::assert_eq;

use kirole_sync::daypack::encode_day_pack;
use kirole_sync::events::encode_record;
use kirole_sync::wire::packetize_bytes;
use kirole_sync::{
    crc16, parse_record, DayPack, EventLog, EventLogType, MemoryStateStore, MessageType,
    PacketAssembler, ReceivedMessage, ScreenSize, SettlementData, SyncConfig, SyncCoordinator,
    SyncDecision, SyncError, TaskSummary, Transport, WeatherInfo,
};

/// Reassembles everything the phone writes, like the firmware would.
#[derive(Default)]
struct SimulatedDevice {
    assembler: PacketAssembler,
    received: Vec<ReceivedMessage>,
    writes: usize,
}

impl Transport for SimulatedDevice {
    fn write(&mut self, packet: &[u8]) -> Result<(), SyncError> {
        self.writes += 1;
        if let Some(message) = self.assembler.append(packet) {
            self.received.push(message);
        }
        Ok(())
    }
}

impl SimulatedDevice {
    fn received_kinds(&self) -> Vec<MessageType> {
        self.received.iter().filter_map(|m| m.kind()).collect()
    }
}

fn shanghai(s: &str) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(8 * 3600).unwrap();
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&offset)
}

fn day_pack() -> DayPack {
    DayPack::new(
        NaiveDate::from_ymd_opt(2026, 2, 4).unwrap(),
        "Good morning, Mika",
        "4 tasks and 2 meetings today",
        "Design review at 10:00",
        "Tiny steps still count",
    )
    .with_weather(WeatherInfo {
        temperature: 6,
        high_temp: 9,
        low_temp: 1,
        condition: "rain".to_string(),
        icon_name: "cloud.rain".to_string(),
    })
    .with_schedule_summary("Review 10:00, 1:1 15:00")
    .with_tasks(vec![
        TaskSummary::new("9b6c1e1a-4a52-4b8e-9d43-3a1a5a7e2f10", "Draft quarterly plan"),
        TaskSummary::new("2f0e4a8c-7d1b-4c55-8a8e-5c6b7d8e9f01", "Book dentist"),
        TaskSummary::new("c3d4e5f6-0718-4a2b-9c3d-4e5f60718293", "Water plants"),
        TaskSummary::new("d4e5f607-1829-4b3c-8d4e-5f6071829304", "Reply to Sam"),
    ])
    .with_settlement(SettlementData {
        tasks_completed: 1,
        tasks_total: 4,
        points_earned: 25,
        streak_days: 3,
        pet_mood: "curious".to_string(),
        summary_message: "A calm start".to_string(),
        encouragement_message: "Keep the streak alive".to_string(),
        ..SettlementData::default()
    })
}

fn coordinator() -> SyncCoordinator<MemoryStateStore, SimulatedDevice> {
    SyncCoordinator::new(
        SyncConfig::default(),
        MemoryStateStore::default(),
        SimulatedDevice::default(),
    )
    .unwrap()
}

#[test]
fn test_day_pack_reaches_device_intact() {
    let mut sync = coordinator();
    let now = shanghai("2026-02-04T09:15:00+08:00");

    let outcome = sync.perform_sync(&day_pack(), &now, false).unwrap();
    assert!(outcome.synced());
    assert_eq!(outcome.packets_sent, sync.transport().writes);

    let device = sync.transport();
    assert_eq!(
        device.received_kinds(),
        vec![MessageType::Time, MessageType::DayPack, MessageType::EventLogRequest]
    );
    // Device clock is set to the user's local time.
    assert_eq!(device.received[0].payload, vec![26, 2, 4, 9, 15, 0]);
    assert_eq!(
        device.received[1].payload,
        encode_day_pack(&day_pack(), ScreenSize::FourInch)
    );
    assert!(device.assembler.pending_messages().is_empty());
}

#[test]
fn test_day_and_night_cadence() {
    let mut sync = coordinator();
    let pack = day_pack();

    sync.perform_sync(&pack, &shanghai("2026-02-04T10:00:00+08:00"), false)
        .unwrap();

    let early = sync
        .perform_sync(&pack, &shanghai("2026-02-04T10:30:00+08:00"), false)
        .unwrap();
    assert!(!early.synced());

    let hourly = sync
        .perform_sync(&pack, &shanghai("2026-02-04T11:01:00+08:00"), false)
        .unwrap();
    assert_eq!(hourly.decision, SyncDecision::IntervalElapsed);
    assert!(!hourly.day_pack_sent);

    sync.perform_sync(&pack, &shanghai("2026-02-04T23:30:00+08:00"), false)
        .unwrap();
    let after_midnight = sync
        .perform_sync(&pack, &shanghai("2026-02-05T01:00:00+08:00"), false)
        .unwrap();
    assert!(!after_midnight.synced());
    assert_eq!(
        after_midnight.next_sync,
        shanghai("2026-02-05T03:30:00+08:00").with_timezone(&Utc)
    );

    let night = sync
        .perform_sync(&pack, &shanghai("2026-02-05T03:31:00+08:00"), false)
        .unwrap();
    assert!(night.synced());
}

#[test]
fn test_changed_content_waits_unless_forced() {
    let mut sync = coordinator();
    sync.perform_sync(&day_pack(), &shanghai("2026-02-04T10:00:00+08:00"), false)
        .unwrap();

    let mut edited = day_pack();
    edited.top_tasks[0].is_completed = true;
    let now = shanghai("2026-02-04T10:10:00+08:00");

    let gated = sync.perform_sync(&edited, &now, false).unwrap();
    assert!(gated.content_changed);
    assert!(!gated.synced());

    let forced = sync.perform_sync(&edited, &now, true).unwrap();
    assert_eq!(forced.decision, SyncDecision::Forced);
    assert!(forced.day_pack_sent);
    assert_eq!(
        sync.store().last_fingerprint,
        Some(edited.stable_fingerprint())
    );
}

#[test]
fn test_device_events_flow_back() {
    let mut sync = coordinator();
    let base = DateTime::from_timestamp(1_770_170_000, 0).unwrap();

    let events = [
        EventLog::new(EventLogType::EnterTaskIn, base, 0),
        EventLog::new(EventLogType::CompleteTask, base + chrono::Duration::seconds(95), 0),
        EventLog::new(EventLogType::LowBattery, base + chrono::Duration::seconds(300), 18),
    ];
    let mut batch = vec![events.len() as u8];
    for event in &events {
        batch.extend(encode_record(event));
    }

    let packets =
        packetize_bytes(MessageType::EventLogBatch.as_byte(), 512, &batch, 17).unwrap();
    assert_eq!(packets.len(), 2);

    let mut decoded = Vec::new();
    for packet in &packets {
        decoded.extend(sync.handle_notification(packet));
    }
    // A retransmitted fragment does not replay the batch.
    assert!(sync.handle_notification(&packets[1]).is_empty());

    let kinds: Vec<EventLogType> = decoded.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![EventLogType::EnterTaskIn, EventLogType::CompleteTask, EventLogType::LowBattery]
    );
    assert_eq!(decoded[2].battery_level(), Some(18));
    assert_eq!(
        sync.store().last_event_timestamp,
        Some(base + chrono::Duration::seconds(300))
    );

    // The next request asks only for newer events.
    sync.perform_sync(&day_pack(), &shanghai("2026-02-04T12:00:00+08:00"), false)
        .unwrap();
    let request = sync.transport().received.last().unwrap();
    assert_eq!(request.kind(), Some(MessageType::EventLogRequest));
    assert_eq!(request.payload, (1_770_170_300u32).to_be_bytes().to_vec());
}

#[test]
fn test_reference_behaviour() {
    assert_eq!(crc16(b"123456789"), 0x29B1);

    let mut record = vec![0x03];
    record.extend_from_slice(&1_700_000_100u32.to_be_bytes());
    record.extend_from_slice(&3i16.to_be_bytes());
    let event = parse_record(&record).unwrap();
    assert_eq!(event.event_type, EventLogType::EncoderShortPress);
    assert_eq!(event.epoch_seconds(), 1_700_000_100);
    assert_eq!(event.value, 3);

    assert!(parse_record(&record[..6]).is_none());
    record[0] = 0xEE;
    assert!(parse_record(&record).is_none());
}

#[test]
fn test_day_pack_json_fixture() {
    let pack = day_pack();
    let json = serde_json::to_string(&pack).unwrap();
    let restored: DayPack = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, pack);
    assert_eq!(restored.stable_fingerprint(), pack.stable_fingerprint());
}
