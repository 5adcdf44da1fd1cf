use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::domain::models::SlotId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("schedule preferences not found")]
    PreferencesNotFound,
    #[error("no tasks to schedule")]
    NoTasksToSchedule,
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("schedule slot not found: {0}")]
    SlotNotFound(SlotId),
    #[error("{0}")]
    Validation(String),
    #[error("plan cannot extend beyond the task's deadline ({deadline}); requested end {requested_end}")]
    DeadlineExceeded {
        deadline: NaiveDate,
        requested_end: NaiveDateTime,
    },
    #[error("time slot overlaps with an existing plan (slot {existing_slot_id})")]
    Conflict { existing_slot_id: SlotId },
    #[error("external plan rejected: {0}")]
    ExternalPlan(String),
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PreferencesNotFound
            | Self::NoTasksToSchedule
            | Self::TaskNotFound(_)
            | Self::SlotNotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Conflict { .. } => "conflict",
            Self::ExternalPlan(_) => "external_plan",
        }
    }
}

impl From<String> for ScheduleError {
    fn from(message: String) -> Self {
        Self::Validation(message)
    }
}
