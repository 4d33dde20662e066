//! Sync configuration
//!
//! Policy windows, link parameters and their JSON form. Everything has a
//! default matching the shipped firmware, so an empty JSON object is a
//! valid configuration.

use serde::{Deserialize, Serialize};

use crate::daypack::ScreenSize;
use crate::error::SyncError;
use crate::wire::{DEFAULT_COMPLETED_HISTORY, DEFAULT_MAX_CHUNK_SIZE, HEADER_SIZE};

/// Largest ATT attribute value a peripheral can accept.
const MAX_ATT_VALUE: usize = 512;

/// Refresh requests closer together than this are dropped.
pub const DEFAULT_REFRESH_MIN_INTERVAL_SECS: u64 = 2;

/// Day/night windows and the minimum spacing between syncs in each
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicyConfig {
    /// Local hour at which the day window opens
    pub day_start_hour: u32,
    /// Local hour at which the night window opens
    pub night_start_hour: u32,
    pub day_interval_minutes: u32,
    pub night_interval_minutes: u32,
    /// Let a changed day pack skip the interval gate
    pub content_change_bypasses_interval: bool,
    /// Minimum spacing between device-initiated refresh requests
    pub refresh_min_interval_secs: u64,
}

impl Default for SyncPolicyConfig {
    fn default() -> Self {
        Self {
            day_start_hour: 8,
            night_start_hour: 23,
            day_interval_minutes: 60,
            night_interval_minutes: 240,
            content_change_bypasses_interval: false,
            refresh_min_interval_secs: DEFAULT_REFRESH_MIN_INTERVAL_SECS,
        }
    }
}

impl SyncPolicyConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.day_start_hour > 23 || self.night_start_hour > 23 {
            return Err(SyncError::InvalidConfig(format!(
                "window hours must be 0-23, got day_start_hour={} night_start_hour={}",
                self.day_start_hour, self.night_start_hour
            )));
        }
        if self.day_start_hour == self.night_start_hour {
            return Err(SyncError::InvalidConfig(
                "day_start_hour and night_start_hour must differ".to_string(),
            ));
        }
        if self.day_interval_minutes == 0 || self.night_interval_minutes == 0 {
            return Err(SyncError::InvalidConfig(
                "sync intervals must be at least one minute".to_string(),
            ));
        }
        Ok(())
    }
}

/// Radio link and receiver parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Payload bytes per fragment
    pub max_chunk_size: usize,
    /// Target panel, which bounds the tasks sent per day pack
    pub screen: ScreenSize,
    /// Completed messages the assembler remembers for duplicate suppression
    pub completed_history: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            screen: ScreenSize::default(),
            completed_history: DEFAULT_COMPLETED_HISTORY,
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_chunk_size == 0 {
            return Err(SyncError::InvalidChunkSize);
        }
        if self.max_chunk_size + HEADER_SIZE > MAX_ATT_VALUE {
            return Err(SyncError::InvalidConfig(format!(
                "max_chunk_size {} plus the {}-byte header exceeds {} bytes",
                self.max_chunk_size, HEADER_SIZE, MAX_ATT_VALUE
            )));
        }
        Ok(())
    }
}

/// Complete configuration for a sync session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub policy: SyncPolicyConfig,
    pub link: LinkConfig,
}

impl SyncConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        self.policy.validate()?;
        self.link.validate()
    }
}
