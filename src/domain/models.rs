use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub type OwnerId = i64;
pub type TaskId = i64;
pub type SlotId = i64;

pub const MAX_HOUR: u8 = 23;
pub const MIN_SLOT_HOURS: u8 = 1;
pub const MAX_SLOT_HOURS: u8 = 8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub owner_id: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub priority: i32,
    pub deadline: NaiveDate,
    pub completed: bool,
    /// Reporting only; slot length never depends on it.
    pub estimated_minutes: u32,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")?;
        if self.estimated_minutes == 0 {
            return Err("task.estimated_minutes must be > 0".to_string());
        }
        Ok(())
    }

    /// Latest instant a session for this task may end.
    pub fn deadline_at(&self) -> NaiveDateTime {
        self.deadline.and_time(NaiveTime::MIN)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i32,
    pub deadline: NaiveDate,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub deadline: Option<NaiveDate>,
    pub completed: Option<bool>,
    pub estimated_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulePreferences {
    pub owner_id: OwnerId,
    pub preferred_start_hour: u8,
    pub preferred_end_hour: u8,
    /// Comma separated day tokens, stored exactly as the user entered them.
    pub preferred_days: String,
    pub auto_plan_enabled: bool,
}

impl SchedulePreferences {
    pub fn validate(&self) -> Result<(), String> {
        validate_hour(self.preferred_start_hour, "preferences.preferred_start_hour")?;
        validate_hour(self.preferred_end_hour, "preferences.preferred_end_hour")
    }

    pub fn day_tokens(&self) -> Vec<String> {
        self.preferred_days
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreferencesUpdate {
    pub preferred_start_hour: u8,
    pub preferred_end_hour: u8,
    pub preferred_days: String,
    #[serde(default)]
    pub auto_plan_enabled: Option<bool>,
}

impl PreferencesUpdate {
    pub fn validate(&self) -> Result<(), String> {
        validate_hour(self.preferred_start_hour, "preferred_start_hour")?;
        validate_hour(self.preferred_end_hour, "preferred_end_hour")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    Auto,
    Manual,
    External,
}

impl SlotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::External => "external",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleSlot {
    pub id: Option<SlotId>,
    pub owner_id: OwnerId,
    #[serde(with = "day_name")]
    pub day: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub task_id: Option<TaskId>,
    pub topic_id: Option<i64>,
    pub source: SlotSource,
}

impl ScheduleSlot {
    pub fn validate(&self) -> Result<(), String> {
        if self.end_time <= self.start_time {
            return Err("slot.end_time must be after slot.start_time".to_string());
        }
        Ok(())
    }

    /// Inclusive time-of-day comparison; the weekday is not considered.
    pub fn touches_time_of_day(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time <= end && self.end_time >= start
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanRequest {
    #[serde(default)]
    pub preferred_start_hour: Option<u8>,
    #[serde(default)]
    pub preferred_end_hour: Option<u8>,
    #[serde(default)]
    pub preferred_days: Option<Vec<String>>,
    #[serde(default)]
    pub task_duration_hours: Option<u8>,
}

impl PlanRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(hour) = self.preferred_start_hour {
            validate_hour(hour, "preferred_start_hour")?;
        }
        if let Some(hour) = self.preferred_end_hour {
            validate_hour(hour, "preferred_end_hour")?;
        }
        if let Some(hours) = self.task_duration_hours {
            validate_slot_hours(hours, "task_duration_hours")?;
        }
        Ok(())
    }

    /// Start, end and days are all supplied, so stored preferences are not needed.
    pub fn is_complete(&self) -> bool {
        self.preferred_start_hour.is_some()
            && self.preferred_end_hour.is_some()
            && self.preferred_days.is_some()
    }
}

/// One row of the schedule as shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: SlotId,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub task_id: Option<TaskId>,
    pub task_title: Option<String>,
    pub source: SlotSource,
}

pub fn validate_hour(value: u8, field_name: &str) -> Result<(), String> {
    if value > MAX_HOUR {
        return Err(format!("{field_name} must be between 0 and {MAX_HOUR}"));
    }
    Ok(())
}

pub fn validate_slot_hours(value: u8, field_name: &str) -> Result<(), String> {
    if !(MIN_SLOT_HOURS..=MAX_SLOT_HOURS).contains(&value) {
        return Err(format!(
            "{field_name} must be between {MIN_SLOT_HOURS} and {MAX_SLOT_HOURS}"
        ));
    }
    Ok(())
}

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Parses a canonical weekday name as written by [`weekday_name`].
pub fn parse_weekday_name(value: &str) -> Option<Weekday> {
    match value {
        "Monday" => Some(Weekday::Mon),
        "Tuesday" => Some(Weekday::Tue),
        "Wednesday" => Some(Weekday::Wed),
        "Thursday" => Some(Weekday::Thu),
        "Friday" => Some(Weekday::Fri),
        "Saturday" => Some(Weekday::Sat),
        "Sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn date_in_week(week_start: NaiveDate, day: Weekday) -> NaiveDate {
    week_start + Duration::days(i64::from(day.num_days_from_monday()))
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

pub(crate) mod day_name {
    use super::{parse_weekday_name, weekday_name};
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(weekday_name(*day))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Weekday, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_weekday_name(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown weekday: {raw}")))
    }
}
