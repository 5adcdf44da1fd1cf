use crate::domain::models::{
    parse_weekday_name, weekday_name, NewTask, OwnerId, PreferencesUpdate, SchedulePreferences,
    ScheduleSlot, SlotId, SlotSource, Task, TaskId,
};
use crate::infrastructure::error::InfraError;
use chrono::NaiveTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TASK_COLUMNS: &str =
    "id, owner_id, title, description, priority, deadline, completed, estimated_minutes";
const SLOT_COLUMNS: &str = "id, owner_id, day, start_time, end_time, task_id, topic_id, source";
const DAY_ORDER_SQL: &str = "CASE day
    WHEN 'Monday' THEN 0 WHEN 'Tuesday' THEN 1 WHEN 'Wednesday' THEN 2
    WHEN 'Thursday' THEN 3 WHEN 'Friday' THEN 4 WHEN 'Saturday' THEN 5
    WHEN 'Sunday' THEN 6 ELSE 7 END";

/// Persistence for tasks, preferences and slots. Every call is scoped to one
/// owner and never touches another owner's rows.
pub trait PlanStore: Send + Sync {
    fn create_task(&self, owner_id: OwnerId, task: &NewTask) -> Result<Task, InfraError>;
    fn list_tasks(&self, owner_id: OwnerId) -> Result<Vec<Task>, InfraError>;
    /// The scheduling backlog: incomplete tasks ordered by priority value
    /// (ascending), then deadline, then id.
    fn list_incomplete_tasks(&self, owner_id: OwnerId) -> Result<Vec<Task>, InfraError>;
    fn find_task(&self, owner_id: OwnerId, task_id: TaskId) -> Result<Option<Task>, InfraError>;
    fn find_task_by_title(&self, owner_id: OwnerId, title: &str)
    -> Result<Option<Task>, InfraError>;
    fn save_task(&self, task: &Task) -> Result<bool, InfraError>;
    fn delete_task(&self, owner_id: OwnerId, task_id: TaskId) -> Result<bool, InfraError>;

    fn get_preferences(&self, owner_id: OwnerId)
    -> Result<Option<SchedulePreferences>, InfraError>;
    fn upsert_preferences(
        &self,
        owner_id: OwnerId,
        update: &PreferencesUpdate,
    ) -> Result<SchedulePreferences, InfraError>;

    /// Slots ordered Monday to Sunday, then by start time.
    fn list_slots(&self, owner_id: OwnerId) -> Result<Vec<ScheduleSlot>, InfraError>;

    /// Opens a unit of work over the owner's slots. Dropping it without
    /// calling [`SlotUnitOfWork::commit`] discards every change.
    fn begin(&self, owner_id: OwnerId) -> Result<Box<dyn SlotUnitOfWork + '_>, InfraError>;
}

pub trait SlotUnitOfWork {
    fn list_slots(&self) -> Result<Vec<ScheduleSlot>, InfraError>;
    fn delete_all_slots(&mut self) -> Result<usize, InfraError>;
    fn delete_slots_by_source(&mut self, source: SlotSource) -> Result<usize, InfraError>;
    fn delete_slot(&mut self, slot_id: SlotId) -> Result<bool, InfraError>;
    fn update_slot_times(
        &mut self,
        slot_id: SlotId,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Option<ScheduleSlot>, InfraError>;
    /// Inserts slots in order and returns them with their assigned ids.
    fn insert_slots(&mut self, slots: &[ScheduleSlot]) -> Result<Vec<ScheduleSlot>, InfraError>;
    fn commit(self: Box<Self>) -> Result<(), InfraError>;
}

fn ensure_owned(owner_id: OwnerId, slots: &[ScheduleSlot]) -> Result<(), InfraError> {
    if let Some(foreign) = slots.iter().find(|slot| slot.owner_id != owner_id) {
        return Err(InfraError::validation(format!(
            "slot for owner {} cannot be written in a unit of work for owner {owner_id}",
            foreign.owner_id
        )));
    }
    for slot in slots {
        slot.validate().map_err(InfraError::validation)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqlitePlanStore {
    db_path: PathBuf,
}

impl SqlitePlanStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(connection)
    }

    fn query_tasks(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(sql)?;
        let tasks = statement
            .query_map(params, task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: row.get(4)?,
        deadline: row.get(5)?,
        completed: row.get(6)?,
        estimated_minutes: row.get(7)?,
    })
}

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleSlot> {
    let day_raw: String = row.get(2)?;
    let day = parse_weekday_name(&day_raw)
        .ok_or_else(|| conversion_error(2, format!("unknown weekday '{day_raw}'")))?;
    let source_raw: String = row.get(7)?;
    let source = SlotSource::parse(&source_raw)
        .ok_or_else(|| conversion_error(7, format!("unknown slot source '{source_raw}'")))?;

    Ok(ScheduleSlot {
        id: Some(row.get(0)?),
        owner_id: row.get(1)?,
        day,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        task_id: row.get(5)?,
        topic_id: row.get(6)?,
        source,
    })
}

fn preferences_from_row(row: &Row<'_>) -> rusqlite::Result<SchedulePreferences> {
    Ok(SchedulePreferences {
        owner_id: row.get(0)?,
        preferred_start_hour: row.get(1)?,
        preferred_end_hour: row.get(2)?,
        preferred_days: row.get(3)?,
        auto_plan_enabled: row.get(4)?,
    })
}

fn select_slots(connection: &Connection, owner_id: OwnerId) -> Result<Vec<ScheduleSlot>, InfraError> {
    let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM schedule_slots WHERE owner_id = ?1
         ORDER BY {DAY_ORDER_SQL}, start_time, id"
    );
    let mut statement = connection.prepare(&sql)?;
    let slots = statement
        .query_map(params![owner_id], slot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(slots)
}

impl PlanStore for SqlitePlanStore {
    fn create_task(&self, owner_id: OwnerId, task: &NewTask) -> Result<Task, InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO tasks (owner_id, title, description, priority, deadline, completed, estimated_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                owner_id,
                task.title,
                task.description,
                task.priority,
                task.deadline,
                task.estimated_minutes
            ],
        )?;
        Ok(Task {
            id: connection.last_insert_rowid(),
            owner_id,
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            deadline: task.deadline,
            completed: false,
            estimated_minutes: task.estimated_minutes,
        })
    }

    fn list_tasks(&self, owner_id: OwnerId) -> Result<Vec<Task>, InfraError> {
        self.query_tasks(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 ORDER BY id"),
            params![owner_id],
        )
    }

    fn list_incomplete_tasks(&self, owner_id: OwnerId) -> Result<Vec<Task>, InfraError> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 AND completed = 0
                 ORDER BY priority, deadline, id"
            ),
            params![owner_id],
        )
    }

    fn find_task(&self, owner_id: OwnerId, task_id: TaskId) -> Result<Option<Task>, InfraError> {
        let connection = self.connect()?;
        let task = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 AND id = ?2"),
                params![owner_id, task_id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn find_task_by_title(
        &self,
        owner_id: OwnerId,
        title: &str,
    ) -> Result<Option<Task>, InfraError> {
        let connection = self.connect()?;
        let task = connection
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 AND title = ?2
                     ORDER BY id LIMIT 1"
                ),
                params![owner_id, title],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn save_task(&self, task: &Task) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE tasks SET title = ?3, description = ?4, priority = ?5, deadline = ?6,
               completed = ?7, estimated_minutes = ?8
             WHERE owner_id = ?1 AND id = ?2",
            params![
                task.owner_id,
                task.id,
                task.title,
                task.description,
                task.priority,
                task.deadline,
                task.completed,
                task.estimated_minutes
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_task(&self, owner_id: OwnerId, task_id: TaskId) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "DELETE FROM tasks WHERE owner_id = ?1 AND id = ?2",
            params![owner_id, task_id],
        )?;
        Ok(changed > 0)
    }

    fn get_preferences(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<SchedulePreferences>, InfraError> {
        let connection = self.connect()?;
        let preferences = connection
            .query_row(
                "SELECT owner_id, preferred_start_hour, preferred_end_hour, preferred_days, auto_plan_enabled
                 FROM schedule_preferences WHERE owner_id = ?1",
                params![owner_id],
                preferences_from_row,
            )
            .optional()?;
        Ok(preferences)
    }

    fn upsert_preferences(
        &self,
        owner_id: OwnerId,
        update: &PreferencesUpdate,
    ) -> Result<SchedulePreferences, InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO schedule_preferences
               (owner_id, preferred_start_hour, preferred_end_hour, preferred_days, auto_plan_enabled)
             VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 1))
             ON CONFLICT(owner_id) DO UPDATE SET
               preferred_start_hour = excluded.preferred_start_hour,
               preferred_end_hour = excluded.preferred_end_hour,
               preferred_days = excluded.preferred_days,
               auto_plan_enabled = COALESCE(?5, schedule_preferences.auto_plan_enabled)",
            params![
                owner_id,
                update.preferred_start_hour,
                update.preferred_end_hour,
                update.preferred_days,
                update.auto_plan_enabled
            ],
        )?;
        drop(connection);
        self.get_preferences(owner_id)?.ok_or_else(|| {
            InfraError::Internal(format!("preferences for owner {owner_id} were not stored"))
        })
    }

    fn list_slots(&self, owner_id: OwnerId) -> Result<Vec<ScheduleSlot>, InfraError> {
        let connection = self.connect()?;
        select_slots(&connection, owner_id)
    }

    fn begin(&self, owner_id: OwnerId) -> Result<Box<dyn SlotUnitOfWork + '_>, InfraError> {
        let connection = self.connect()?;
        connection.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteUnitOfWork {
            connection,
            owner_id,
            committed: false,
        }))
    }
}

struct SqliteUnitOfWork {
    connection: Connection,
    owner_id: OwnerId,
    committed: bool,
}

impl SqliteUnitOfWork {
    fn find_slot(&self, slot_id: SlotId) -> Result<Option<ScheduleSlot>, InfraError> {
        let slot = self
            .connection
            .query_row(
                &format!("SELECT {SLOT_COLUMNS} FROM schedule_slots WHERE owner_id = ?1 AND id = ?2"),
                params![self.owner_id, slot_id],
                slot_from_row,
            )
            .optional()?;
        Ok(slot)
    }
}

impl SlotUnitOfWork for SqliteUnitOfWork {
    fn list_slots(&self) -> Result<Vec<ScheduleSlot>, InfraError> {
        select_slots(&self.connection, self.owner_id)
    }

    fn delete_all_slots(&mut self) -> Result<usize, InfraError> {
        let deleted = self.connection.execute(
            "DELETE FROM schedule_slots WHERE owner_id = ?1",
            params![self.owner_id],
        )?;
        Ok(deleted)
    }

    fn delete_slots_by_source(&mut self, source: SlotSource) -> Result<usize, InfraError> {
        let deleted = self.connection.execute(
            "DELETE FROM schedule_slots WHERE owner_id = ?1 AND source = ?2",
            params![self.owner_id, source.as_str()],
        )?;
        Ok(deleted)
    }

    fn delete_slot(&mut self, slot_id: SlotId) -> Result<bool, InfraError> {
        let deleted = self.connection.execute(
            "DELETE FROM schedule_slots WHERE owner_id = ?1 AND id = ?2",
            params![self.owner_id, slot_id],
        )?;
        Ok(deleted > 0)
    }

    fn update_slot_times(
        &mut self,
        slot_id: SlotId,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Option<ScheduleSlot>, InfraError> {
        let changed = self.connection.execute(
            "UPDATE schedule_slots SET start_time = ?3, end_time = ?4 WHERE owner_id = ?1 AND id = ?2",
            params![self.owner_id, slot_id, start_time, end_time],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.find_slot(slot_id)
    }

    fn insert_slots(&mut self, slots: &[ScheduleSlot]) -> Result<Vec<ScheduleSlot>, InfraError> {
        ensure_owned(self.owner_id, slots)?;
        let mut statement = self.connection.prepare(
            "INSERT INTO schedule_slots (owner_id, day, start_time, end_time, task_id, topic_id, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        let mut inserted = Vec::with_capacity(slots.len());
        for slot in slots {
            let id = statement.insert(params![
                slot.owner_id,
                weekday_name(slot.day),
                slot.start_time,
                slot.end_time,
                slot.task_id,
                slot.topic_id,
                slot.source.as_str()
            ])?;
            inserted.push(ScheduleSlot {
                id: Some(id),
                ..slot.clone()
            });
        }
        Ok(inserted)
    }

    fn commit(mut self: Box<Self>) -> Result<(), InfraError> {
        self.connection.execute_batch("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for SqliteUnitOfWork {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.connection.execute_batch("ROLLBACK");
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tasks: Vec<Task>,
    preferences: HashMap<OwnerId, SchedulePreferences>,
    slots: Vec<ScheduleSlot>,
}

#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    state: Mutex<MemoryState>,
    next_id: AtomicI64,
}

impl InMemoryPlanStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::Internal(format!("plan store lock poisoned: {error}")))
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn sort_for_display(slots: &mut [ScheduleSlot]) {
    slots.sort_by(|left, right| {
        left.day
            .num_days_from_monday()
            .cmp(&right.day.num_days_from_monday())
            .then(left.start_time.cmp(&right.start_time))
            .then(left.id.cmp(&right.id))
    });
}

impl PlanStore for InMemoryPlanStore {
    fn create_task(&self, owner_id: OwnerId, task: &NewTask) -> Result<Task, InfraError> {
        let created = Task {
            id: self.allocate_id(),
            owner_id,
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            deadline: task.deadline,
            completed: false,
            estimated_minutes: task.estimated_minutes,
        };
        self.lock()?.tasks.push(created.clone());
        Ok(created)
    }

    fn list_tasks(&self, owner_id: OwnerId) -> Result<Vec<Task>, InfraError> {
        Ok(self
            .lock()?
            .tasks
            .iter()
            .filter(|task| task.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn list_incomplete_tasks(&self, owner_id: OwnerId) -> Result<Vec<Task>, InfraError> {
        let mut tasks = self
            .list_tasks(owner_id)?
            .into_iter()
            .filter(|task| !task.completed)
            .collect::<Vec<_>>();
        tasks.sort_by(|left, right| {
            left.priority
                .cmp(&right.priority)
                .then(left.deadline.cmp(&right.deadline))
                .then(left.id.cmp(&right.id))
        });
        Ok(tasks)
    }

    fn find_task(&self, owner_id: OwnerId, task_id: TaskId) -> Result<Option<Task>, InfraError> {
        Ok(self
            .lock()?
            .tasks
            .iter()
            .find(|task| task.owner_id == owner_id && task.id == task_id)
            .cloned())
    }

    fn find_task_by_title(
        &self,
        owner_id: OwnerId,
        title: &str,
    ) -> Result<Option<Task>, InfraError> {
        Ok(self
            .lock()?
            .tasks
            .iter()
            .find(|task| task.owner_id == owner_id && task.title == title)
            .cloned())
    }

    fn save_task(&self, task: &Task) -> Result<bool, InfraError> {
        let mut state = self.lock()?;
        let Some(stored) = state
            .tasks
            .iter_mut()
            .find(|candidate| candidate.owner_id == task.owner_id && candidate.id == task.id)
        else {
            return Ok(false);
        };
        *stored = task.clone();
        Ok(true)
    }

    fn delete_task(&self, owner_id: OwnerId, task_id: TaskId) -> Result<bool, InfraError> {
        let mut state = self.lock()?;
        let before = state.tasks.len();
        state
            .tasks
            .retain(|task| !(task.owner_id == owner_id && task.id == task_id));
        if state.tasks.len() == before {
            return Ok(false);
        }
        for slot in state.slots.iter_mut() {
            if slot.owner_id == owner_id && slot.task_id == Some(task_id) {
                slot.task_id = None;
            }
        }
        Ok(true)
    }

    fn get_preferences(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<SchedulePreferences>, InfraError> {
        Ok(self.lock()?.preferences.get(&owner_id).cloned())
    }

    fn upsert_preferences(
        &self,
        owner_id: OwnerId,
        update: &PreferencesUpdate,
    ) -> Result<SchedulePreferences, InfraError> {
        let mut state = self.lock()?;
        let auto_plan_enabled = update.auto_plan_enabled.unwrap_or_else(|| {
            state
                .preferences
                .get(&owner_id)
                .map(|existing| existing.auto_plan_enabled)
                .unwrap_or(true)
        });
        let preferences = SchedulePreferences {
            owner_id,
            preferred_start_hour: update.preferred_start_hour,
            preferred_end_hour: update.preferred_end_hour,
            preferred_days: update.preferred_days.clone(),
            auto_plan_enabled,
        };
        state.preferences.insert(owner_id, preferences.clone());
        Ok(preferences)
    }

    fn list_slots(&self, owner_id: OwnerId) -> Result<Vec<ScheduleSlot>, InfraError> {
        let mut slots = self
            .lock()?
            .slots
            .iter()
            .filter(|slot| slot.owner_id == owner_id)
            .cloned()
            .collect::<Vec<_>>();
        sort_for_display(&mut slots);
        Ok(slots)
    }

    fn begin(&self, owner_id: OwnerId) -> Result<Box<dyn SlotUnitOfWork + '_>, InfraError> {
        let staged = self.list_slots(owner_id)?;
        Ok(Box::new(InMemoryUnitOfWork {
            store: self,
            owner_id,
            staged,
        }))
    }
}

/// Works on a private copy of the owner's slots; commit swaps it in.
struct InMemoryUnitOfWork<'a> {
    store: &'a InMemoryPlanStore,
    owner_id: OwnerId,
    staged: Vec<ScheduleSlot>,
}

impl SlotUnitOfWork for InMemoryUnitOfWork<'_> {
    fn list_slots(&self) -> Result<Vec<ScheduleSlot>, InfraError> {
        let mut slots = self.staged.clone();
        sort_for_display(&mut slots);
        Ok(slots)
    }

    fn delete_all_slots(&mut self) -> Result<usize, InfraError> {
        let deleted = self.staged.len();
        self.staged.clear();
        Ok(deleted)
    }

    fn delete_slots_by_source(&mut self, source: SlotSource) -> Result<usize, InfraError> {
        let before = self.staged.len();
        self.staged.retain(|slot| slot.source != source);
        Ok(before - self.staged.len())
    }

    fn delete_slot(&mut self, slot_id: SlotId) -> Result<bool, InfraError> {
        let before = self.staged.len();
        self.staged.retain(|slot| slot.id != Some(slot_id));
        Ok(self.staged.len() != before)
    }

    fn update_slot_times(
        &mut self,
        slot_id: SlotId,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Option<ScheduleSlot>, InfraError> {
        let Some(slot) = self
            .staged
            .iter_mut()
            .find(|slot| slot.id == Some(slot_id))
        else {
            return Ok(None);
        };
        slot.start_time = start_time;
        slot.end_time = end_time;
        Ok(Some(slot.clone()))
    }

    fn insert_slots(&mut self, slots: &[ScheduleSlot]) -> Result<Vec<ScheduleSlot>, InfraError> {
        ensure_owned(self.owner_id, slots)?;
        let inserted = slots
            .iter()
            .map(|slot| ScheduleSlot {
                id: Some(self.store.allocate_id()),
                ..slot.clone()
            })
            .collect::<Vec<_>>();
        self.staged.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    fn commit(self: Box<Self>) -> Result<(), InfraError> {
        let Self {
            store,
            owner_id,
            staged,
        } = *self;
        let mut state = store.lock()?;
        state.slots.retain(|slot| slot.owner_id != owner_id);
        state.slots.extend(staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use chrono::{NaiveDate, Weekday};
    use tempfile::TempDir;

    fn sqlite_store() -> (TempDir, SqlitePlanStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("studyplan.sqlite");
        initialize_database(&path).expect("init database");
        (dir, SqlitePlanStore::new(path))
    }

    fn new_task(title: &str, priority: i32, deadline: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
            priority,
            deadline: NaiveDate::parse_from_str(deadline, "%Y-%m-%d").expect("valid date"),
            estimated_minutes: 60,
        }
    }

    fn slot(owner_id: OwnerId, day: Weekday, start: u32, source: SlotSource) -> ScheduleSlot {
        ScheduleSlot {
            id: None,
            owner_id,
            day,
            start_time: NaiveTime::from_hms_opt(start, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(start + 1, 0, 0).expect("valid time"),
            task_id: None,
            topic_id: None,
            source,
        }
    }

    fn exercise_backlog_ordering(store: &dyn PlanStore) {
        store.create_task(1, &new_task("late", 2, "2026-03-01")).expect("create");
        store.create_task(1, &new_task("urgent", 1, "2026-03-05")).expect("create");
        let mut done = store
            .create_task(1, &new_task("done", 0, "2026-02-01"))
            .expect("create");
        store.create_task(1, &new_task("soon", 1, "2026-02-20")).expect("create");
        store.create_task(2, &new_task("other owner", 0, "2026-02-01")).expect("create");

        done.completed = true;
        assert!(store.save_task(&done).expect("save"));

        let backlog = store.list_incomplete_tasks(1).expect("backlog");
        let titles = backlog.iter().map(|task| task.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["soon", "urgent", "late"]);
        assert_eq!(store.list_tasks(1).expect("list").len(), 4);
        assert!(store.find_task_by_title(1, "other owner").expect("find").is_none());
    }

    fn exercise_unit_of_work(store: &dyn PlanStore) {
        let mut unit = store.begin(1).expect("begin");
        unit.insert_slots(&[
            slot(1, Weekday::Wed, 9, SlotSource::Auto),
            slot(1, Weekday::Mon, 14, SlotSource::Manual),
            slot(1, Weekday::Mon, 9, SlotSource::Auto),
        ])
        .expect("insert");
        unit.commit().expect("commit");

        let listed = store.list_slots(1).expect("list");
        let order = listed
            .iter()
            .map(|slot| (slot.day, slot.start_time.format("%H").to_string()))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                (Weekday::Mon, "09".to_string()),
                (Weekday::Mon, "14".to_string()),
                (Weekday::Wed, "09".to_string()),
            ]
        );

        {
            let mut unit = store.begin(1).expect("begin");
            assert_eq!(unit.delete_all_slots().expect("delete"), 3);
            // dropped without commit
        }
        assert_eq!(store.list_slots(1).expect("list").len(), 3);

        let mut unit = store.begin(1).expect("begin");
        assert_eq!(unit.delete_slots_by_source(SlotSource::Auto).expect("delete"), 2);
        unit.commit().expect("commit");
        let remaining = store.list_slots(1).expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].source, SlotSource::Manual);

        let mut unit = store.begin(1).expect("begin");
        let foreign = unit.insert_slots(&[slot(2, Weekday::Mon, 9, SlotSource::Auto)]);
        assert!(foreign.is_err());
    }

    #[test]
    fn sqlite_backlog_is_owner_scoped_and_ordered() {
        let (_dir, store) = sqlite_store();
        exercise_backlog_ordering(&store);
    }

    #[test]
    fn memory_backlog_is_owner_scoped_and_ordered() {
        exercise_backlog_ordering(&InMemoryPlanStore::default());
    }

    #[test]
    fn sqlite_unit_of_work_commits_and_rolls_back() {
        let (_dir, store) = sqlite_store();
        exercise_unit_of_work(&store);
    }

    #[test]
    fn memory_unit_of_work_commits_and_rolls_back() {
        exercise_unit_of_work(&InMemoryPlanStore::default());
    }

    #[test]
    fn sqlite_upsert_preferences_overwrites_fields() {
        let (_dir, store) = sqlite_store();
        assert!(store.get_preferences(4).expect("get").is_none());

        let created = store
            .upsert_preferences(
                4,
                &PreferencesUpdate {
                    preferred_start_hour: 9,
                    preferred_end_hour: 12,
                    preferred_days: "Mon,Tue".to_string(),
                    auto_plan_enabled: Some(false),
                },
            )
            .expect("insert preferences");
        assert!(!created.auto_plan_enabled);

        let updated = store
            .upsert_preferences(
                4,
                &PreferencesUpdate {
                    preferred_start_hour: 18,
                    preferred_end_hour: 21,
                    preferred_days: "Saturday, Sunday".to_string(),
                    auto_plan_enabled: None,
                },
            )
            .expect("update preferences");
        assert_eq!(updated.preferred_start_hour, 18);
        assert_eq!(updated.preferred_days, "Saturday, Sunday");
        assert!(!updated.auto_plan_enabled);
    }

    #[test]
    fn sqlite_update_and_delete_slot() {
        let (_dir, store) = sqlite_store();
        let task = store.create_task(1, &new_task("essay", 1, "2026-05-01")).expect("create");
        let mut linked = slot(1, Weekday::Tue, 10, SlotSource::Manual);
        linked.task_id = Some(task.id);

        let mut unit = store.begin(1).expect("begin");
        let inserted = unit.insert_slots(&[linked]).expect("insert");
        unit.commit().expect("commit");
        let slot_id = inserted[0].id.expect("assigned id");

        let mut unit = store.begin(1).expect("begin");
        let moved = unit
            .update_slot_times(
                slot_id,
                NaiveTime::from_hms_opt(15, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(16, 30, 0).expect("valid time"),
            )
            .expect("update")
            .expect("slot exists");
        assert_eq!(moved.end_time.format("%H:%M").to_string(), "16:30");
        assert!(unit.update_slot_times(slot_id + 100, moved.start_time, moved.end_time)
            .expect("update")
            .is_none());
        unit.commit().expect("commit");

        assert!(store.delete_task(1, task.id).expect("delete task"));
        let listed = store.list_slots(1).expect("list");
        assert_eq!(listed[0].task_id, None);

        let mut unit = store.begin(1).expect("begin");
        assert!(unit.delete_slot(slot_id).expect("delete slot"));
        unit.commit().expect("commit");
        assert!(store.list_slots(1).expect("list").is_empty());
    }
}
