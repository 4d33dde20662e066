//! Content fingerprint of a day pack
//!
//! Every field is fed to SHA-256 in a fixed schema order, each as a
//! length-prefixed `name` / `value` pair, so no two distinct packs share an
//! input stream. The pack's `id` is identity, not content, and is skipped.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::model::{DayPack, SettlementData, TaskSummary, WeatherInfo};
use crate::error::SyncError;

/// SHA-256 digest of a pack's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| SyncError::ParseError(format!("fingerprint '{}': {}", s, e)))?;
        Ok(Fingerprint(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Streams named fields into the hasher.
struct CanonicalWriter {
    hasher: Sha256,
}

impl CanonicalWriter {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    fn bytes(&mut self, name: &str, value: &[u8]) {
        self.hasher.update((name.len() as u32).to_be_bytes());
        self.hasher.update(name.as_bytes());
        self.hasher.update((value.len() as u32).to_be_bytes());
        self.hasher.update(value);
    }

    fn str(&mut self, name: &str, value: &str) {
        self.bytes(name, value.as_bytes());
    }

    fn int(&mut self, name: &str, value: i64) {
        self.bytes(name, &value.to_be_bytes());
    }

    fn flag(&mut self, name: &str, value: bool) {
        self.bytes(name, &[value as u8]);
    }

    fn opt_str(&mut self, name: &str, value: Option<&str>) {
        self.flag(name, value.is_some());
        if let Some(value) = value {
            self.str(name, value);
        }
    }

    fn finish(self) -> Fingerprint {
        let digest = self.hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }
}

impl DayPack {
    /// Deterministic content hash used to skip re-sending an unchanged pack.
    pub fn stable_fingerprint(&self) -> Fingerprint {
        let mut w = CanonicalWriter::new();

        w.str("date", &self.date.format("%Y-%m-%d").to_string());
        w.str("device_mode", self.device_mode.as_str());
        w.flag("focus_challenge", self.focus_challenge_enabled);

        w.flag("weather", self.weather.is_some());
        if let Some(weather) = &self.weather {
            write_weather(&mut w, weather);
        }

        w.str("morning_greeting", &self.morning_greeting);
        w.str("daily_summary", &self.daily_summary);
        w.str("first_item", &self.first_item);
        w.opt_str(
            "current_schedule_summary",
            self.current_schedule_summary.as_deref(),
        );
        w.str("companion_phrase", &self.companion_phrase);

        w.int("top_tasks.count", self.top_tasks.len() as i64);
        for task in &self.top_tasks {
            write_task(&mut w, task);
        }

        write_settlement(&mut w, &self.settlement);
        w.finish()
    }
}

fn write_weather(w: &mut CanonicalWriter, weather: &WeatherInfo) {
    w.int("weather.temperature", weather.temperature.into());
    w.int("weather.high", weather.high_temp.into());
    w.int("weather.low", weather.low_temp.into());
    w.str("weather.condition", &weather.condition);
    w.str("weather.icon", &weather.icon_name);
}

fn write_task(w: &mut CanonicalWriter, task: &TaskSummary) {
    w.str("task.id", &task.id);
    w.str("task.title", &task.title);
    w.flag("task.completed", task.is_completed);
    w.int("task.priority", task.priority.into());
    w.opt_str("task.due", task.due_time.as_deref());
    w.opt_str("task.micro_action", task.micro_action.as_deref());
}

fn write_settlement(w: &mut CanonicalWriter, s: &SettlementData) {
    w.int("settlement.completed", s.tasks_completed.into());
    w.int("settlement.total", s.tasks_total.into());
    w.int("settlement.points", s.points_earned.into());
    w.int("settlement.streak", s.streak_days.into());
    w.str("settlement.mood", &s.pet_mood);
    w.str("settlement.summary", &s.summary_message);
    w.str("settlement.encouragement", &s.encouragement_message);
    w.int("settlement.focus_minutes", s.total_focus_minutes.into());
    w.int("settlement.focus_sessions", s.focus_session_count.into());
    w.int("settlement.longest_focus", s.longest_focus_minutes.into());
    w.int("settlement.interruptions", s.interruption_count.into());
}
