use crate::domain::error::ScheduleError;
use crate::domain::models::{PlanRequest, SchedulePreferences};

/// Parameters for one scheduling run after overrides are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePreferences {
    pub start_hour: u8,
    pub end_hour: u8,
    pub days: Vec<String>,
    pub slot_hours: u8,
}

impl EffectivePreferences {
    /// An inverted or zero-width window produces no slots; it is not rejected.
    pub fn window_is_empty(&self) -> bool {
        self.end_hour <= self.start_hour
    }
}

/// Merges a request override with stored preferences, field by field.
///
/// Stored preferences may be absent only when the override names start hour,
/// end hour and days. The slot length has no stored counterpart and falls
/// back to `default_slot_hours`.
pub fn resolve_preferences(
    request: &PlanRequest,
    stored: Option<&SchedulePreferences>,
    default_slot_hours: u8,
) -> Result<EffectivePreferences, ScheduleError> {
    request.validate()?;

    let slot_hours = request
        .task_duration_hours
        .filter(|hours| *hours > 0)
        .unwrap_or(default_slot_hours);

    let Some(stored) = stored else {
        return match (
            request.preferred_start_hour,
            request.preferred_end_hour,
            request.preferred_days.as_ref(),
        ) {
            (Some(start_hour), Some(end_hour), Some(days)) => Ok(EffectivePreferences {
                start_hour,
                end_hour,
                days: days.clone(),
                slot_hours,
            }),
            _ => Err(ScheduleError::PreferencesNotFound),
        };
    };

    Ok(EffectivePreferences {
        start_hour: request
            .preferred_start_hour
            .unwrap_or(stored.preferred_start_hour),
        end_hour: request.preferred_end_hour.unwrap_or(stored.preferred_end_hour),
        days: request
            .preferred_days
            .clone()
            .unwrap_or_else(|| stored.day_tokens()),
        slot_hours,
    })
}
