use chrono::{DateTime, Datelike, NaiveDateTime};

use crate::domain::error::ScheduleError;
use crate::domain::models::{OwnerId, ScheduleSlot, SlotSource, Task};

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parses an ISO-8601 date-time. Offsets are accepted and dropped; the
/// wall-clock reading is what gets scheduled.
pub fn parse_timestamp(value: &str, field_name: &str) -> Result<NaiveDateTime, ScheduleError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_local());
    }
    LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| {
            ScheduleError::Validation(format!("{field_name} must be an ISO-8601 date-time"))
        })
}

/// Checks a single requested session and builds the slot to insert.
///
/// Checks run in a fixed order: the task must exist, the session must end by
/// the task's deadline, and no existing slot of the owner may touch the
/// requested time of day. The overlap test ignores the weekday.
pub fn validate_manual_slot(
    owner_id: OwnerId,
    title: &str,
    task: Option<&Task>,
    start: NaiveDateTime,
    end: NaiveDateTime,
    existing: &[ScheduleSlot],
) -> Result<ScheduleSlot, ScheduleError> {
    let task = task.ok_or_else(|| ScheduleError::TaskNotFound(title.to_string()))?;

    if end <= start {
        return Err(ScheduleError::Validation(
            "end time must be after start time".to_string(),
        ));
    }
    if end.date() != start.date() {
        return Err(ScheduleError::Validation(
            "a session must start and end on the same day".to_string(),
        ));
    }

    if end > task.deadline_at() {
        return Err(ScheduleError::DeadlineExceeded {
            deadline: task.deadline,
            requested_end: end,
        });
    }

    if let Some(conflicting) = existing
        .iter()
        .filter(|slot| slot.owner_id == owner_id)
        .find(|slot| slot.touches_time_of_day(start.time(), end.time()))
    {
        return Err(ScheduleError::Conflict {
            existing_slot_id: conflicting.id.unwrap_or_default(),
        });
    }

    Ok(ScheduleSlot {
        id: None,
        owner_id,
        day: start.weekday(),
        start_time: start.time(),
        end_time: end.time(),
        task_id: Some(task.id),
        topic_id: None,
        source: SlotSource::Manual,
    })
}
