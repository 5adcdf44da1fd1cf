use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::error::ScheduleError;
use crate::domain::models::{
    date_in_week, parse_hhmm, parse_weekday_name, OwnerId, ScheduleSlot, SlotSource, Task,
};

/// One entry of a plan proposed by an external planner.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProposedSlot {
    pub title: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

/// Parses planner output as a JSON array of [`ProposedSlot`].
///
/// Text around the outermost array (prose, code fences) is ignored; the array
/// itself must match the schema exactly.
pub fn parse_proposal(raw: &str) -> Result<Vec<ProposedSlot>, ScheduleError> {
    let (Some(open), Some(close)) = (raw.find('['), raw.rfind(']')) else {
        return Err(ScheduleError::ExternalPlan(
            "planner output does not contain a JSON array".to_string(),
        ));
    };
    if close < open {
        return Err(ScheduleError::ExternalPlan(
            "planner output does not contain a JSON array".to_string(),
        ));
    }
    serde_json::from_str(&raw[open..=close])
        .map_err(|error| ScheduleError::ExternalPlan(format!("invalid plan schema: {error}")))
}

/// Turns proposed entries into slots for `owner_id`.
///
/// Entries naming a task outside `tasks` are skipped. Any entry that would end
/// after its task's deadline rejects the whole proposal.
pub fn accept_proposal(
    owner_id: OwnerId,
    proposal: &[ProposedSlot],
    tasks: &[Task],
    week_start: NaiveDate,
) -> Result<Vec<ScheduleSlot>, ScheduleError> {
    let mut slots = Vec::with_capacity(proposal.len());

    for entry in proposal {
        let Some(task) = tasks.iter().find(|task| task.title == entry.title) else {
            continue;
        };
        let day = parse_weekday_name(entry.day.trim()).ok_or_else(|| {
            ScheduleError::ExternalPlan(format!("unknown day '{}'", entry.day))
        })?;
        let start_time = parse_hhmm(&entry.start_time).ok_or_else(|| {
            ScheduleError::ExternalPlan(format!("start_time '{}' must be HH:MM", entry.start_time))
        })?;
        let end_time = parse_hhmm(&entry.end_time).ok_or_else(|| {
            ScheduleError::ExternalPlan(format!("end_time '{}' must be HH:MM", entry.end_time))
        })?;
        if end_time <= start_time {
            return Err(ScheduleError::ExternalPlan(format!(
                "entry for '{}' ends before it starts",
                entry.title
            )));
        }

        let session_end = date_in_week(week_start, day).and_time(end_time);
        if session_end > task.deadline_at() {
            return Err(ScheduleError::DeadlineExceeded {
                deadline: task.deadline,
                requested_end: session_end,
            });
        }

        slots.push(ScheduleSlot {
            id: None,
            owner_id,
            day,
            start_time,
            end_time,
            task_id: Some(task.id),
            topic_id: None,
            source: SlotSource::External,
        });
    }

    Ok(slots)
}
