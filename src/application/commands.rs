use crate::application::bootstrap::bootstrap_workspace;
use crate::application::external_planner::{
    CommandPlanner, ExternalPlanner, DEFAULT_PLANNER_NOTES,
};
use crate::domain::days::expand_days;
use crate::domain::error::ScheduleError;
use crate::domain::external::{accept_proposal, parse_proposal};
use crate::domain::manual::{parse_timestamp, validate_manual_slot};
use crate::domain::models::{
    format_hhmm, validate_non_empty, week_start, weekday_name, NewTask, OwnerId, PlanRequest,
    PreferencesUpdate, ScheduleEntry, SchedulePreferences, ScheduleSlot, SlotId, SlotSource, Task,
    TaskId, TaskUpdate,
};
use crate::domain::packer::{pack_slots, PackWindow, PlanWeek};
use crate::domain::preferences::resolve_preferences;
use crate::infrastructure::calendar_link::google_calendar_link;
use crate::infrastructure::config::SchedulerSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::plan_store::{PlanStore, SqlitePlanStore};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct AppState {
    store: Arc<dyn PlanStore>,
    settings: SchedulerSettings,
    planner: Option<Arc<dyn ExternalPlanner>>,
    now_provider: NowProvider,
    owner_locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = Arc::new(SqlitePlanStore::new(&bootstrap.database_path));
        let planner = bootstrap
            .settings
            .planner
            .clone()
            .map(|settings| Arc::new(CommandPlanner::new(settings)) as Arc<dyn ExternalPlanner>);

        let mut state = Self::with_store(store, bootstrap.settings);
        state.planner = planner;
        Ok(state)
    }

    pub fn with_store(store: Arc<dyn PlanStore>, settings: SchedulerSettings) -> Self {
        Self {
            store,
            settings,
            planner: None,
            now_provider: Arc::new(Utc::now),
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn ExternalPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        tracing::error!(command, code = error.code(), %error, "command failed");
        error.to_string()
    }

    /// Today in the configured timezone.
    fn today(&self) -> NaiveDate {
        (self.now_provider)()
            .with_timezone(&self.settings.timezone)
            .date_naive()
    }

    /// Runs `operation` while holding the owner's scheduling lock, so slot
    /// replacement for one owner never interleaves with another write.
    fn with_owner_lock<T>(
        &self,
        owner_id: OwnerId,
        operation: impl FnOnce() -> Result<T, InfraError>,
    ) -> Result<T, InfraError> {
        let owner_lock = {
            let mut locks = self
                .owner_locks
                .lock()
                .map_err(|_| InfraError::Internal("owner lock table poisoned".to_string()))?;
            Arc::clone(locks.entry(owner_id).or_default())
        };
        let result = {
            let _guard = owner_lock
                .lock()
                .map_err(|_| InfraError::Internal(format!("lock for owner {owner_id} poisoned")))?;
            operation()
        };
        drop(owner_lock);
        self.release_owner_lock(owner_id);
        result
    }

    /// Drops the owner's table entry once no caller holds it.
    fn release_owner_lock(&self, owner_id: OwnerId) {
        let Ok(mut locks) = self.owner_locks.lock() else {
            return;
        };
        if locks
            .get(&owner_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&owner_id);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub created: usize,
    pub slots: Vec<ScheduleSlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualPlanRequest {
    pub title: String,
    #[serde(alias = "startTime")]
    pub start_time: String,
    #[serde(alias = "endTime")]
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualPlanResponse {
    pub slot: ScheduleSlot,
    pub google_calendar_link: String,
}

fn normalized_description(description: Option<String>) -> Option<String> {
    description
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn required_task(state: &AppState, owner_id: OwnerId, task_id: TaskId) -> Result<Task, InfraError> {
    state
        .store
        .find_task(owner_id, task_id)?
        .ok_or_else(|| ScheduleError::TaskNotFound(task_id.to_string()).into())
}

pub fn create_task_impl(
    state: &AppState,
    owner_id: OwnerId,
    task: NewTask,
) -> Result<Task, InfraError> {
    validate_non_empty(&task.title, "title").map_err(InfraError::validation)?;
    if task.estimated_minutes == 0 {
        return Err(InfraError::validation("estimated_minutes must be > 0"));
    }

    let task = NewTask {
        title: task.title.trim().to_string(),
        description: normalized_description(task.description),
        ..task
    };
    let created = state.store.create_task(owner_id, &task)?;
    tracing::info!(owner_id, task_id = created.id, "task created");
    Ok(created)
}

pub fn list_tasks_impl(state: &AppState, owner_id: OwnerId) -> Result<Vec<Task>, InfraError> {
    state.store.list_tasks(owner_id)
}

pub fn update_task_impl(
    state: &AppState,
    owner_id: OwnerId,
    task_id: TaskId,
    update: TaskUpdate,
) -> Result<Task, InfraError> {
    let mut task = required_task(state, owner_id, task_id)?;

    if let Some(title) = update.title {
        task.title = title.trim().to_string();
    }
    if let Some(description) = update.description {
        task.description = normalized_description(Some(description));
    }
    if let Some(priority) = update.priority {
        task.priority = priority;
    }
    if let Some(deadline) = update.deadline {
        task.deadline = deadline;
    }
    if let Some(completed) = update.completed {
        task.completed = completed;
    }
    if let Some(estimated_minutes) = update.estimated_minutes {
        task.estimated_minutes = estimated_minutes;
    }
    task.validate().map_err(InfraError::validation)?;

    if !state.store.save_task(&task)? {
        return Err(ScheduleError::TaskNotFound(task_id.to_string()).into());
    }
    tracing::info!(owner_id, task_id, "task updated");
    Ok(task)
}

pub fn complete_task_impl(
    state: &AppState,
    owner_id: OwnerId,
    task_id: TaskId,
) -> Result<Task, InfraError> {
    let mut task = required_task(state, owner_id, task_id)?;
    if task.completed {
        return Err(InfraError::validation("task is already completed"));
    }
    task.completed = true;
    if !state.store.save_task(&task)? {
        return Err(ScheduleError::TaskNotFound(task_id.to_string()).into());
    }
    tracing::info!(owner_id, task_id, "task completed");
    Ok(task)
}

pub fn delete_task_impl(
    state: &AppState,
    owner_id: OwnerId,
    task_id: TaskId,
) -> Result<bool, InfraError> {
    let deleted = state.store.delete_task(owner_id, task_id)?;
    if deleted {
        tracing::info!(owner_id, task_id, "task deleted");
    }
    Ok(deleted)
}

pub fn get_preferences_impl(
    state: &AppState,
    owner_id: OwnerId,
) -> Result<Option<SchedulePreferences>, InfraError> {
    state.store.get_preferences(owner_id)
}

pub fn upsert_preferences_impl(
    state: &AppState,
    owner_id: OwnerId,
    update: PreferencesUpdate,
) -> Result<SchedulePreferences, InfraError> {
    update.validate().map_err(InfraError::validation)?;
    let stored = state.store.upsert_preferences(owner_id, &update)?;
    tracing::info!(
        owner_id,
        start_hour = stored.preferred_start_hour,
        end_hour = stored.preferred_end_hour,
        "preferences saved"
    );
    Ok(stored)
}

/// Replaces the owner's `auto` slots with a fresh weekly plan.
pub fn auto_plan_impl(
    state: &AppState,
    owner_id: OwnerId,
    request: PlanRequest,
) -> Result<PlanResponse, InfraError> {
    let week = week_start(state.today());

    state.with_owner_lock(owner_id, || {
        let stored = state.store.get_preferences(owner_id)?;
        let effective =
            resolve_preferences(&request, stored.as_ref(), state.settings.default_slot_hours)?;

        let backlog = state.store.list_incomplete_tasks(owner_id)?;
        if backlog.is_empty() {
            return Err(ScheduleError::NoTasksToSchedule.into());
        }

        let days = expand_days(&effective.days, state.settings.day_policy);
        if days.is_empty() {
            tracing::warn!(owner_id, tokens = ?effective.days, "no recognised days in plan");
        }
        if effective.window_is_empty() {
            tracing::warn!(
                owner_id,
                start_hour = effective.start_hour,
                end_hour = effective.end_hour,
                "planning window is empty"
            );
        }

        let window = PackWindow {
            start_hour: effective.start_hour,
            end_hour: effective.end_hour,
            slot_hours: effective.slot_hours,
        };
        let plan_week = PlanWeek {
            week_start: week,
            deadline_policy: state.settings.deadline_policy,
        };
        let planned = pack_slots(owner_id, window, &days, &backlog, plan_week);
        let skipped = backlog.len().saturating_sub(planned.len());
        if skipped > 0 {
            tracing::info!(owner_id, skipped, "tasks left unplanned this week");
        }

        let mut unit = state.store.begin(owner_id)?;
        let replaced = unit.delete_slots_by_source(SlotSource::Auto)?;
        let slots = unit.insert_slots(&planned)?;
        unit.commit()?;

        if slots.is_empty() {
            tracing::warn!(owner_id, "auto plan created no slots");
        }
        tracing::info!(owner_id, created = slots.len(), replaced, "auto plan stored");
        Ok(PlanResponse {
            created: slots.len(),
            slots,
        })
    })
}

pub fn manual_plan_impl(
    state: &AppState,
    owner_id: OwnerId,
    request: ManualPlanRequest,
) -> Result<ManualPlanResponse, InfraError> {
    let title = request.title.trim();

    let (slot, start, end) = state.with_owner_lock(owner_id, || {
        let task = state
            .store
            .find_task_by_title(owner_id, title)?
            .ok_or_else(|| ScheduleError::TaskNotFound(title.to_string()))?;
        let start = parse_timestamp(&request.start_time, "start_time")?;
        let end = parse_timestamp(&request.end_time, "end_time")?;

        let mut unit = state.store.begin(owner_id)?;
        let existing = unit.list_slots()?;
        let slot = validate_manual_slot(owner_id, title, Some(&task), start, end, &existing)?;
        let mut inserted = unit.insert_slots(&[slot])?;
        unit.commit()?;
        let slot = inserted
            .pop()
            .ok_or_else(|| InfraError::Internal("manual slot was not stored".to_string()))?;
        Ok((slot, start, end))
    })?;

    let link = google_calendar_link(
        title,
        start,
        end,
        &format!("Manual study session for {title}"),
    )?;
    tracing::info!(owner_id, slot_id = ?slot.id, day = weekday_name(slot.day), "manual slot stored");
    Ok(ManualPlanResponse {
        slot,
        google_calendar_link: link,
    })
}

/// Moves a slot to new times of day. The weekday is kept.
pub fn update_slot_impl(
    state: &AppState,
    owner_id: OwnerId,
    slot_id: SlotId,
    start_time: String,
    end_time: String,
) -> Result<ScheduleSlot, InfraError> {
    let start = parse_timestamp(&start_time, "start_time")?;
    let end = parse_timestamp(&end_time, "end_time")?;
    if end.time() <= start.time() {
        return Err(InfraError::validation("end time must be after start time"));
    }

    let updated = state.with_owner_lock(owner_id, || {
        let mut unit = state.store.begin(owner_id)?;
        let updated = unit
            .update_slot_times(slot_id, start.time(), end.time())?
            .ok_or(ScheduleError::SlotNotFound(slot_id))?;
        unit.commit()?;
        Ok(updated)
    })?;
    tracing::info!(owner_id, slot_id, "slot updated");
    Ok(updated)
}

pub fn delete_slot_impl(
    state: &AppState,
    owner_id: OwnerId,
    slot_id: SlotId,
) -> Result<bool, InfraError> {
    state.with_owner_lock(owner_id, || {
        let mut unit = state.store.begin(owner_id)?;
        if !unit.delete_slot(slot_id)? {
            return Err(ScheduleError::SlotNotFound(slot_id).into());
        }
        unit.commit()?;
        tracing::info!(owner_id, slot_id, "slot deleted");
        Ok(true)
    })
}

pub fn clear_slots_impl(state: &AppState, owner_id: OwnerId) -> Result<usize, InfraError> {
    state.with_owner_lock(owner_id, || {
        let mut unit = state.store.begin(owner_id)?;
        let deleted = unit.delete_all_slots()?;
        unit.commit()?;
        tracing::info!(owner_id, deleted, "slots cleared");
        Ok(deleted)
    })
}

pub fn list_schedule_impl(
    state: &AppState,
    owner_id: OwnerId,
) -> Result<Vec<ScheduleEntry>, InfraError> {
    let titles = state
        .store
        .list_tasks(owner_id)?
        .into_iter()
        .map(|task| (task.id, task.title))
        .collect::<HashMap<_, _>>();

    let entries = state
        .store
        .list_slots(owner_id)?
        .into_iter()
        .filter_map(|slot| {
            Some(ScheduleEntry {
                id: slot.id?,
                day: weekday_name(slot.day).to_string(),
                start_time: format_hhmm(slot.start_time),
                end_time: format_hhmm(slot.end_time),
                task_id: slot.task_id,
                task_title: slot.task_id.and_then(|task_id| titles.get(&task_id).cloned()),
                source: slot.source,
            })
        })
        .collect();
    Ok(entries)
}

/// Asks the configured planner for a week plan and stores the accepted part
/// of it as `external` slots.
pub async fn external_plan_impl(
    state: &AppState,
    owner_id: OwnerId,
    notes: Option<String>,
) -> Result<PlanResponse, InfraError> {
    let planner = state.planner.clone().ok_or_else(|| {
        ScheduleError::ExternalPlan("no external planner is configured".to_string())
    })?;

    let backlog = state.store.list_incomplete_tasks(owner_id)?;
    if backlog.is_empty() {
        return Err(ScheduleError::NoTasksToSchedule.into());
    }

    let notes = notes
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_PLANNER_NOTES);
    let raw = planner.propose(&backlog, notes).await?;
    let proposal = parse_proposal(&raw)?;
    let week = week_start(state.today());

    state.with_owner_lock(owner_id, || {
        let planned = accept_proposal(owner_id, &proposal, &backlog, week)?;
        let skipped = proposal.len() - planned.len();
        if skipped > 0 {
            tracing::warn!(owner_id, skipped, "planner proposed sessions for unknown tasks");
        }

        let mut unit = state.store.begin(owner_id)?;
        let slots = unit.insert_slots(&planned)?;
        unit.commit()?;
        tracing::info!(owner_id, created = slots.len(), "external plan stored");
        Ok(PlanResponse {
            created: slots.len(),
            slots,
        })
    })
}
