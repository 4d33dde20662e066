//! Binary payloads the firmware renders
//!
//! Strings are written as a length byte followed by UTF-8, cut to a
//! per-field maximum on a character boundary. Counters are clamped to the
//! width of their slot.

use chrono::{Datelike, NaiveDate, Timelike};

use super::model::{DayPack, DeviceMode, ScreenSize};

const MAX_GREETING: usize = 50;
const MAX_DAILY_SUMMARY: usize = 60;
const MAX_FIRST_ITEM: usize = 40;
const MAX_SCHEDULE_SUMMARY: usize = 30;
const MAX_COMPANION_PHRASE: usize = 40;
const MAX_TASK_ID: usize = 36;
const MAX_TASK_TITLE: usize = 30;
const MAX_MICRO_ACTION: usize = 40;
const MAX_SETTLEMENT_MESSAGE: usize = 50;

/// Encode a day pack for a panel of the given size.
///
/// ```text
/// year-2000, month, day, mode, focus flag
/// greeting, daily summary, first item, schedule summary, companion phrase
/// task count, then per task: id, title, micro action, completed, priority
/// completed (u8), total (u8), points (u16), streak (u8),
/// focus minutes (u16), focus sessions (u8), longest focus (u16),
/// interruptions (u8), summary message, encouragement message
/// ```
pub fn encode_day_pack(pack: &DayPack, screen: ScreenSize) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);

    push_date(&mut out, pack.date);
    out.push(pack.device_mode.as_byte());
    out.push(pack.focus_challenge_enabled as u8);

    push_str(&mut out, &pack.morning_greeting, MAX_GREETING);
    push_str(&mut out, &pack.daily_summary, MAX_DAILY_SUMMARY);
    push_str(&mut out, &pack.first_item, MAX_FIRST_ITEM);
    push_str(
        &mut out,
        pack.current_schedule_summary.as_deref().unwrap_or(""),
        MAX_SCHEDULE_SUMMARY,
    );
    push_str(&mut out, &pack.companion_phrase, MAX_COMPANION_PHRASE);

    let tasks = &pack.top_tasks[..pack.top_tasks.len().min(screen.max_tasks())];
    out.push(tasks.len() as u8);
    for task in tasks {
        push_str(&mut out, &task.id, MAX_TASK_ID);
        push_str(&mut out, &task.title, MAX_TASK_TITLE);
        push_str(
            &mut out,
            task.micro_action.as_deref().unwrap_or(""),
            MAX_MICRO_ACTION,
        );
        out.push(task.is_completed as u8);
        out.push(task.priority.clamp(0, u8::MAX as i32) as u8);
    }

    let s = &pack.settlement;
    out.push(clamp_u8(s.tasks_completed));
    out.push(clamp_u8(s.tasks_total));
    out.extend_from_slice(&clamp_u16(s.points_earned).to_be_bytes());
    out.push(clamp_u8(s.streak_days));
    out.extend_from_slice(&clamp_u16(s.total_focus_minutes).to_be_bytes());
    out.push(clamp_u8(s.focus_session_count));
    out.extend_from_slice(&clamp_u16(s.longest_focus_minutes).to_be_bytes());
    out.push(clamp_u8(s.interruption_count));
    push_str(&mut out, &s.summary_message, MAX_SETTLEMENT_MESSAGE);
    push_str(&mut out, &s.encouragement_message, MAX_SETTLEMENT_MESSAGE);

    out
}

/// Clock payload: year-2000, month, day, hour, minute, second.
///
/// Pass the time already converted to the wall clock the device should show.
pub fn encode_time<T: Datelike + Timelike>(now: &T) -> [u8; 6] {
    [
        year_offset(now.year()),
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second().min(59) as u8,
    ]
}

pub fn encode_device_mode(mode: DeviceMode) -> [u8; 1] {
    [mode.as_byte()]
}

fn push_date(out: &mut Vec<u8>, date: NaiveDate) {
    out.push(year_offset(date.year()));
    out.push(date.month() as u8);
    out.push(date.day() as u8);
}

fn year_offset(year: i32) -> u8 {
    (year - 2000).clamp(0, u8::MAX as i32) as u8
}

fn push_str(out: &mut Vec<u8>, value: &str, max_len: usize) {
    let value = truncate_utf8(value, max_len);
    out.push(value.len() as u8);
    out.extend_from_slice(value.as_bytes());
}

/// Longest prefix of `value` that fits in `max_len` bytes without splitting a character.
fn truncate_utf8(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn clamp_u8(value: u32) -> u8 {
    value.min(u8::MAX as u32) as u8
}

fn clamp_u16(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}
