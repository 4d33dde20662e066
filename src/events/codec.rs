//! Event log record codec
//!
//! ```text
//! byte 0     : event type code
//! bytes 1-4  : Unix timestamp, seconds (BE u32)
//! bytes 5-6  : signed value (BE i16)
//! ```
//!
//! A batch notification prefixes the records with a one-byte count.

use chrono::{DateTime, Utc};
use log::debug;
use thiserror::Error;

use super::types::{EventLog, EventLogType};

/// Size of one hardware record.
pub const RECORD_SIZE: usize = 7;

/// Why a record was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record too short: {0} bytes, need {RECORD_SIZE}")]
    TooShort(usize),

    #[error("unknown event type code {0:#04x}")]
    UnknownType(u8),
}

/// Decode one record, reporting why it was rejected.
///
/// Bytes past the first seven are ignored.
pub fn decode_record(data: &[u8]) -> Result<EventLog, RecordError> {
    if data.len() < RECORD_SIZE {
        return Err(RecordError::TooShort(data.len()));
    }

    let event_type =
        EventLogType::from_raw_byte(data[0]).ok_or(RecordError::UnknownType(data[0]))?;
    let seconds = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    let value = i16::from_be_bytes([data[5], data[6]]);

    // Every u32 second count is inside chrono's supported range.
    let timestamp = DateTime::<Utc>::from_timestamp(i64::from(seconds), 0).unwrap_or_default();

    Ok(EventLog::new(event_type, timestamp, i32::from(value)))
}

/// Decode one record; malformed input yields `None`.
pub fn parse_record(data: &[u8]) -> Option<EventLog> {
    match decode_record(data) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("dropping event record: {}", e);
            None
        }
    }
}

/// Decode a batch payload: a count byte followed by that many records.
///
/// Undecodable records are skipped. A payload shorter than the declared
/// count stops at the last whole record.
pub fn parse_batch(payload: &[u8]) -> Vec<EventLog> {
    let Some((&count, records)) = payload.split_first() else {
        debug!("empty event batch");
        return Vec::new();
    };

    let available = records.len() / RECORD_SIZE;
    if available < count as usize {
        debug!(
            "event batch truncated: declared {} records, {} present",
            count, available
        );
    }

    records
        .chunks_exact(RECORD_SIZE)
        .take(count as usize)
        .filter_map(parse_record)
        .collect()
}

/// Encode one event as a hardware record.
///
/// Timestamps outside the u32 range and values outside i16 are clamped.
pub fn encode_record(event: &EventLog) -> [u8; RECORD_SIZE] {
    let seconds = event.epoch_seconds().clamp(0, i64::from(u32::MAX)) as u32;
    let value = event.value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;

    let mut out = [0u8; RECORD_SIZE];
    out[0] = event.event_type.raw_byte();
    out[1..5].copy_from_slice(&seconds.to_be_bytes());
    out[5..7].copy_from_slice(&value.to_be_bytes());
    out
}

/// Payload asking the device for every event newer than `since` (Unix seconds).
pub fn encode_event_log_request(since: u32) -> [u8; 4] {
    since.to_be_bytes()
}
