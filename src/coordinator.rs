//! Sync coordinator
//!
//! Drives one sync cycle against a device: fingerprint the day pack, ask the
//! policy, then push the clock, the day pack (when it changed) and an event
//! log request. Inbound notifications go through the owned assembler and come
//! back as decoded events.
//!
//! ```text
//!   DayPack ──▶ fingerprint ──▶ SyncPolicy ──▶ packetize ──▶ Transport
//!   Transport ──▶ PacketAssembler ──▶ event codec ──▶ Vec<EventLog>
//! ```
//!
//! Persistence and the radio are injected through [`SyncStateStore`] and
//! [`Transport`], so the coordinator itself never blocks on I/O it owns.

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{LinkConfig, SyncConfig};
use crate::daypack::{encode_day_pack, encode_time, DayPack, Fingerprint};
use crate::error::SyncError;
use crate::events::{encode_event_log_request, parse_batch, parse_record, EventLog};
use crate::policy::{SyncDecision, SyncPolicy};
use crate::wire::{packetize_bytes, MessageIdSequence, MessageType, PacketAssembler};

// ───────────────────────────────────────────────────────────────
// Ports
// ───────────────────────────────────────────────────────────────

/// Persisted sync bookkeeping.
///
/// Implementations decide where this lives (settings file, keychain,
/// database). Every call is expected to be quick and synchronous.
pub trait SyncStateStore {
    /// Time of the last completed sync.
    fn last_sync(&self) -> Result<Option<DateTime<Utc>>, SyncError>;

    fn save_last_sync(&mut self, at: DateTime<Utc>) -> Result<(), SyncError>;

    /// Fingerprint of the last day pack the device acknowledged receiving.
    fn last_fingerprint(&self) -> Result<Option<Fingerprint>, SyncError>;

    fn save_fingerprint(&mut self, fingerprint: Fingerprint) -> Result<(), SyncError>;

    /// Timestamp of the newest event already pulled from the device.
    fn last_event_timestamp(&self) -> Result<Option<DateTime<Utc>>, SyncError>;

    fn save_last_event_timestamp(&mut self, at: DateTime<Utc>) -> Result<(), SyncError>;
}

/// Outbound side of the radio link.
pub trait Transport {
    /// Write one encoded packet to the device.
    fn write(&mut self, packet: &[u8]) -> Result<(), SyncError>;
}

/// In-memory [`SyncStateStore`], also serializable for simple persistence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStateStore {
    pub last_sync: Option<DateTime<Utc>>,
    pub last_fingerprint: Option<Fingerprint>,
    pub last_event_timestamp: Option<DateTime<Utc>>,
}

impl SyncStateStore for MemoryStateStore {
    fn last_sync(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.last_sync)
    }

    fn save_last_sync(&mut self, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.last_sync = Some(at);
        Ok(())
    }

    fn last_fingerprint(&self) -> Result<Option<Fingerprint>, SyncError> {
        Ok(self.last_fingerprint)
    }

    fn save_fingerprint(&mut self, fingerprint: Fingerprint) -> Result<(), SyncError> {
        self.last_fingerprint = Some(fingerprint);
        Ok(())
    }

    fn last_event_timestamp(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.last_event_timestamp)
    }

    fn save_last_event_timestamp(&mut self, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.last_event_timestamp = Some(at);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Coordinator
// ───────────────────────────────────────────────────────────────

/// Result of one [`SyncCoordinator::perform_sync`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub decision: SyncDecision,
    pub fingerprint: Fingerprint,
    pub content_changed: bool,
    pub day_pack_sent: bool,
    pub packets_sent: usize,
    /// Earliest time the interval gate opens again
    pub next_sync: DateTime<Utc>,
}

impl SyncOutcome {
    pub fn synced(&self) -> bool {
        self.decision.should_sync()
    }
}

/// One device session: policy, framing and reassembly over injected ports
pub struct SyncCoordinator<S: SyncStateStore, T: Transport> {
    policy: SyncPolicy,
    link: LinkConfig,
    store: S,
    transport: T,
    assembler: PacketAssembler,
    message_ids: MessageIdSequence,
    last_refresh: Option<DateTime<Utc>>,
}

impl<S: SyncStateStore, T: Transport> SyncCoordinator<S, T> {
    pub fn new(config: SyncConfig, store: S, transport: T) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            policy: SyncPolicy::new(config.policy)?,
            assembler: PacketAssembler::with_history(config.link.completed_history),
            link: config.link,
            store,
            transport,
            message_ids: MessageIdSequence::new(),
            last_refresh: None,
        })
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn assembler(&self) -> &PacketAssembler {
        &self.assembler
    }

    /// Earliest time a non-forced sync will be allowed.
    pub fn next_sync_time<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<DateTime<Utc>, SyncError> {
        let last_sync = self.store.last_sync()?;
        Ok(self.policy.next_sync_time(now, last_sync))
    }

    /// Run one sync cycle.
    ///
    /// `now` should carry the user's local offset: it picks the day or night
    /// window and is what the device clock is set to. A transport or storage
    /// failure aborts the cycle and leaves the last sync time untouched; the
    /// fingerprint is only stored once the day pack has been written.
    pub fn perform_sync<Tz: TimeZone>(
        &mut self,
        pack: &DayPack,
        now: &DateTime<Tz>,
        force: bool,
    ) -> Result<SyncOutcome, SyncError> {
        let last_sync = self.store.last_sync()?;
        let fingerprint = pack.stable_fingerprint();
        let content_changed = self.store.last_fingerprint()? != Some(fingerprint);

        let decision = self
            .policy
            .evaluate(now, last_sync, content_changed, force);
        if !decision.should_sync() {
            return Ok(SyncOutcome {
                decision,
                fingerprint,
                content_changed,
                day_pack_sent: false,
                packets_sent: 0,
                next_sync: self.policy.next_sync_time(now, last_sync),
            });
        }

        let mut packets_sent = self.send(MessageType::Time, &encode_time(now))?;

        let day_pack_sent = if content_changed {
            let payload = encode_day_pack(pack, self.link.screen);
            packets_sent += self.send(MessageType::DayPack, &payload)?;
            self.store.save_fingerprint(fingerprint)?;
            true
        } else {
            false
        };

        let since = self
            .store
            .last_event_timestamp()?
            .map(|at| at.timestamp().clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(0);
        packets_sent += self.send(MessageType::EventLogRequest, &encode_event_log_request(since))?;

        let completed_at = now.with_timezone(&Utc);
        self.store.save_last_sync(completed_at)?;

        info!(
            "sync complete: {} packets, day pack {}",
            packets_sent,
            if day_pack_sent { "sent" } else { "unchanged" }
        );

        Ok(SyncOutcome {
            decision,
            fingerprint,
            content_changed,
            day_pack_sent,
            packets_sent,
            next_sync: self.policy.next_sync_time(now, Some(completed_at)),
        })
    }

    /// Feed one notification from the device.
    ///
    /// Returns the events carried by a message completed by this fragment,
    /// or nothing while fragments are still outstanding.
    pub fn handle_notification(&mut self, data: &[u8]) -> Vec<EventLog> {
        let Some(message) = self.assembler.append(data) else {
            return Vec::new();
        };

        let events = match message.kind() {
            Some(MessageType::EventLogBatch) => parse_batch(&message.payload),
            _ => parse_record(&message.payload).into_iter().collect(),
        };
        debug!(
            "message {} (type {:#04x}) carried {} events",
            message.message_id,
            message.message_type,
            events.len()
        );

        if let Some(newest) = events.iter().map(|e| e.timestamp).max() {
            self.advance_event_timestamp(newest);
        }
        events
    }

    /// Decide whether a `RequestRefresh` from the device, received at `now`,
    /// should be answered with a forced sync. Requests arriving faster than
    /// the configured minimum interval are dropped.
    pub fn accept_refresh_request<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        let now = now.with_timezone(&Utc);
        if !self.policy.allow_refresh_request(now, self.last_refresh) {
            debug!("dropping refresh request, last accepted at {:?}", self.last_refresh);
            return false;
        }
        self.last_refresh = Some(now);
        true
    }

    /// Drop partial inbound messages, e.g. after a disconnect.
    pub fn reset_session(&mut self) {
        self.assembler.reset();
    }

    pub fn into_parts(self) -> (S, T) {
        (self.store, self.transport)
    }

    fn advance_event_timestamp(&mut self, newest: DateTime<Utc>) {
        let current = match self.store.last_event_timestamp() {
            Ok(current) => current,
            Err(e) => {
                warn!("could not read last event timestamp: {}", e);
                return;
            }
        };
        if current.is_some_and(|current| current >= newest) {
            return;
        }
        if let Err(e) = self.store.save_last_event_timestamp(newest) {
            warn!("could not save last event timestamp: {}", e);
        }
    }

    fn send(&mut self, kind: MessageType, payload: &[u8]) -> Result<usize, SyncError> {
        let message_id = self.message_ids.next_id();
        let packets = packetize_bytes(
            kind.as_byte(),
            message_id,
            payload,
            self.link.max_chunk_size,
        )?;
        for packet in &packets {
            self.transport.write(packet)?;
        }
        debug!(
            "sent {:?} as message {} in {} packets",
            kind,
            message_id,
            packets.len()
        );
        Ok(packets.len())
    }
}
