//! Day pack data model
//!
//! A `DayPack` is the immutable snapshot of app state pushed to the device:
//! the start-of-day page, the overview page with top tasks and the evening
//! settlement page.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the device treats input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    #[default]
    Interactive,
    Focus,
}

impl DeviceMode {
    pub fn as_byte(self) -> u8 {
        match self {
            DeviceMode::Interactive => 0x00,
            DeviceMode::Focus => 0x01,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceMode::Interactive => "interactive",
            DeviceMode::Focus => "focus",
        }
    }
}

/// Panel variants, which differ in how many tasks fit the overview page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenSize {
    #[default]
    FourInch,
    SevenInch,
}

impl ScreenSize {
    pub fn max_tasks(self) -> usize {
        match self {
            ScreenSize::FourInch => 3,
            ScreenSize::SevenInch => 5,
        }
    }
}

/// Weather line on the start-of-day page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherInfo {
    /// Current temperature (°C)
    pub temperature: i32,
    pub high_temp: i32,
    pub low_temp: i32,
    pub condition: String,
    pub icon_name: String,
}

/// One task on the overview page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Local due time formatted as `HH:mm`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    /// First micro-action of the task, shown as the next concrete step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micro_action: Option<String>,
}

fn default_priority() -> i32 {
    1
}

impl TaskSummary {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            is_completed: false,
            priority: default_priority(),
            due_time: None,
            micro_action: None,
        }
    }
}

/// End-of-day settlement page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementData {
    pub tasks_completed: u32,
    pub tasks_total: u32,
    pub points_earned: u32,
    pub streak_days: u32,
    pub pet_mood: String,
    pub summary_message: String,
    pub encouragement_message: String,
    pub total_focus_minutes: u32,
    pub focus_session_count: u32,
    pub longest_focus_minutes: u32,
    pub interruption_count: u32,
}

impl SettlementData {
    /// Share of tasks completed, 0.0 when there are none.
    pub fn completion_rate(&self) -> f64 {
        if self.tasks_total == 0 {
            return 0.0;
        }
        self.tasks_completed as f64 / self.tasks_total as f64
    }
}

/// Snapshot of app state sent to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPack {
    /// Identity of this snapshot; not part of its content
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherInfo>,
    #[serde(default)]
    pub device_mode: DeviceMode,
    #[serde(default)]
    pub focus_challenge_enabled: bool,

    // Start of day
    pub morning_greeting: String,
    pub daily_summary: String,
    pub first_item: String,

    // Overview
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_schedule_summary: Option<String>,
    #[serde(default)]
    pub top_tasks: Vec<TaskSummary>,
    pub companion_phrase: String,

    // Settlement
    #[serde(default)]
    pub settlement: SettlementData,
}

impl DayPack {
    /// Build a pack with the required text and defaults for everything else.
    pub fn new(
        date: NaiveDate,
        morning_greeting: impl Into<String>,
        daily_summary: impl Into<String>,
        first_item: impl Into<String>,
        companion_phrase: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            weather: None,
            device_mode: DeviceMode::default(),
            focus_challenge_enabled: false,
            morning_greeting: morning_greeting.into(),
            daily_summary: daily_summary.into(),
            first_item: first_item.into(),
            current_schedule_summary: None,
            top_tasks: Vec::new(),
            companion_phrase: companion_phrase.into(),
            settlement: SettlementData::default(),
        }
    }

    pub fn with_weather(mut self, weather: WeatherInfo) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn with_device_mode(mut self, mode: DeviceMode) -> Self {
        self.device_mode = mode;
        self
    }

    pub fn with_focus_challenge(mut self, enabled: bool) -> Self {
        self.focus_challenge_enabled = enabled;
        self
    }

    pub fn with_schedule_summary(mut self, summary: impl Into<String>) -> Self {
        self.current_schedule_summary = Some(summary.into());
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskSummary>) -> Self {
        self.top_tasks = tasks;
        self
    }

    pub fn with_settlement(mut self, settlement: SettlementData) -> Self {
        self.settlement = settlement;
        self
    }
}
