//! Device event types
//!
//! Event records pushed from the e-ink device (button presses, encoder
//! turns, wake/sleep transitions) and the byte codes that identify them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical device events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLogType {
    // Rotary encoder
    EncoderRotateUp,
    EncoderRotateDown,
    EncoderShortPress,
    EncoderLongPress,

    // Power button
    PowerShortPress,
    PowerLongPress,

    // Task interaction
    EnterTaskIn,
    CompleteTask,
    SkipTask,
    SelectedTaskChanged,
    WheelSelect,
    ViewEventDetail,

    // Reminders
    ReminderAcknowledged,
    ReminderDismissed,

    // Device lifecycle
    RequestRefresh,
    DeviceWake,
    DeviceSleep,
    LowBattery,
}

/// Byte code table.
///
/// Firmware before the encoder/power button split reported wake, sleep and
/// low battery as 0x07-0x09. Those codes stay mapped to the same events so
/// older devices keep working; new firmware sends the canonical codes.
const CODE_TABLE: &[(u8, EventLogType)] = &[
    (0x01, EventLogType::EncoderRotateUp),
    (0x02, EventLogType::EncoderRotateDown),
    (0x03, EventLogType::EncoderShortPress),
    (0x04, EventLogType::EncoderLongPress),
    (0x05, EventLogType::PowerShortPress),
    (0x06, EventLogType::PowerLongPress),
    (0x07, EventLogType::DeviceWake),  // legacy
    (0x08, EventLogType::DeviceSleep), // legacy
    (0x09, EventLogType::LowBattery),  // legacy
    (0x10, EventLogType::EnterTaskIn),
    (0x11, EventLogType::CompleteTask),
    (0x12, EventLogType::SkipTask),
    (0x13, EventLogType::SelectedTaskChanged),
    (0x14, EventLogType::WheelSelect),
    (0x15, EventLogType::ViewEventDetail),
    (0x16, EventLogType::ReminderAcknowledged),
    (0x17, EventLogType::ReminderDismissed),
    (0x20, EventLogType::RequestRefresh),
    (0x30, EventLogType::DeviceWake),
    (0x31, EventLogType::DeviceSleep),
    (0x40, EventLogType::LowBattery),
];

impl EventLogType {
    /// Map a record type byte, accepting legacy aliases.
    pub fn from_raw_byte(byte: u8) -> Option<Self> {
        CODE_TABLE
            .iter()
            .find(|(code, _)| *code == byte)
            .map(|(_, event_type)| *event_type)
    }

    /// Canonical byte code sent by current firmware.
    pub fn raw_byte(self) -> u8 {
        match self {
            EventLogType::EncoderRotateUp => 0x01,
            EventLogType::EncoderRotateDown => 0x02,
            EventLogType::EncoderShortPress => 0x03,
            EventLogType::EncoderLongPress => 0x04,
            EventLogType::PowerShortPress => 0x05,
            EventLogType::PowerLongPress => 0x06,
            EventLogType::EnterTaskIn => 0x10,
            EventLogType::CompleteTask => 0x11,
            EventLogType::SkipTask => 0x12,
            EventLogType::SelectedTaskChanged => 0x13,
            EventLogType::WheelSelect => 0x14,
            EventLogType::ViewEventDetail => 0x15,
            EventLogType::ReminderAcknowledged => 0x16,
            EventLogType::ReminderDismissed => 0x17,
            EventLogType::RequestRefresh => 0x20,
            EventLogType::DeviceWake => 0x30,
            EventLogType::DeviceSleep => 0x31,
            EventLogType::LowBattery => 0x40,
        }
    }

    /// Whether `byte` is a retired code kept for older firmware.
    pub fn is_legacy_code(byte: u8) -> bool {
        Self::from_raw_byte(byte).is_some_and(|event_type| event_type.raw_byte() != byte)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventLogType::EncoderRotateUp => "encoder_rotate_up",
            EventLogType::EncoderRotateDown => "encoder_rotate_down",
            EventLogType::EncoderShortPress => "encoder_short_press",
            EventLogType::EncoderLongPress => "encoder_long_press",
            EventLogType::PowerShortPress => "power_short_press",
            EventLogType::PowerLongPress => "power_long_press",
            EventLogType::EnterTaskIn => "enter_task_in",
            EventLogType::CompleteTask => "complete_task",
            EventLogType::SkipTask => "skip_task",
            EventLogType::SelectedTaskChanged => "selected_task_changed",
            EventLogType::WheelSelect => "wheel_select",
            EventLogType::ViewEventDetail => "view_event_detail",
            EventLogType::ReminderAcknowledged => "reminder_acknowledged",
            EventLogType::ReminderDismissed => "reminder_dismissed",
            EventLogType::RequestRefresh => "request_refresh",
            EventLogType::DeviceWake => "device_wake",
            EventLogType::DeviceSleep => "device_sleep",
            EventLogType::LowBattery => "low_battery",
        }
    }
}

/// A decoded device event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    /// Locally assigned identifier
    pub id: Uuid,
    pub event_type: EventLogType,
    /// Task the event refers to, filled in by the app when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Device timestamp (UTC, second precision)
    pub timestamp: DateTime<Utc>,
    /// Signed event value (encoder delta, battery percentage, ...)
    pub value: i32,
}

impl EventLog {
    pub fn new(event_type: EventLogType, timestamp: DateTime<Utc>, value: i32) -> Self {
        EventLog {
            id: Uuid::new_v4(),
            event_type,
            task_id: None,
            timestamp,
            value,
        }
    }

    /// Attach the task this event refers to
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Battery percentage reported by a low-battery event.
    pub fn battery_level(&self) -> Option<i32> {
        match self.event_type {
            EventLogType::LowBattery => Some(self.value),
            _ => None,
        }
    }

    /// Device timestamp as Unix seconds
    pub fn epoch_seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }
}
