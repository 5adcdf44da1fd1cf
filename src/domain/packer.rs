use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::models::{date_in_week, weekday_name, OwnerId, ScheduleSlot, SlotSource, Task};

const MINUTES_PER_HOUR: u32 = 60;
const MINUTES_PER_DAY: u32 = 24 * MINUTES_PER_HOUR;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeadlinePolicy {
    /// A task never takes a slot that ends after its deadline.
    #[default]
    DropUnmeetable,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    pub slot_hours: u8,
}

/// The week a plan is laid onto and how deadlines constrain it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanWeek {
    /// Monday the weekday list is anchored to.
    pub week_start: NaiveDate,
    pub deadline_policy: DeadlinePolicy,
}

impl PlanWeek {
    fn fits(&self, task: &Task, day: Weekday, end_time: NaiveTime) -> bool {
        match self.deadline_policy {
            DeadlinePolicy::Ignore => true,
            DeadlinePolicy::DropUnmeetable => {
                date_in_week(self.week_start, day).and_time(end_time) <= task.deadline_at()
            }
        }
    }
}

/// Greedy weekly fill: one task per fixed-length slot, in backlog order.
///
/// The caller orders the backlog (priority, then deadline); this function
/// never re-sorts it. Each slot takes the first pending task whose deadline
/// it meets, so each task is placed at most once and, without deadline
/// conflicts, tasks are consumed strictly in order across days. Each day
/// restarts its clock at `start_hour`. The last slot of a day may run past
/// `end_hour`, but never past midnight.
pub fn pack_slots(
    owner_id: OwnerId,
    window: PackWindow,
    days: &[Weekday],
    backlog: &[Task],
    week: PlanWeek,
) -> Vec<ScheduleSlot> {
    let day_start = u32::from(window.start_hour) * MINUTES_PER_HOUR;
    let day_end = u32::from(window.end_hour) * MINUTES_PER_HOUR;
    let slot_minutes = u32::from(window.slot_hours) * MINUTES_PER_HOUR;
    if slot_minutes == 0 {
        return Vec::new();
    }

    let mut slots = Vec::new();
    let mut pending = backlog.iter().collect::<Vec<_>>();

    'days: for day in days {
        let mut clock = day_start;
        while clock < day_end {
            if pending.is_empty() {
                break 'days;
            }
            let slot_end = clock + slot_minutes;
            let (Some(start_time), Some(end_time)) = (time_of_day(clock), time_of_day(slot_end))
            else {
                tracing::warn!(
                    day = weekday_name(*day),
                    start_minute = clock,
                    slot_hours = window.slot_hours,
                    "slot would run past midnight; day stops early"
                );
                break;
            };
            // Later slots of the same day end later, so none of them fits either.
            let Some(index) = pending
                .iter()
                .position(|task| week.fits(task, *day, end_time))
            else {
                break;
            };
            let task = pending.remove(index);

            slots.push(ScheduleSlot {
                id: None,
                owner_id,
                day: *day,
                start_time,
                end_time,
                task_id: Some(task.id),
                topic_id: None,
                source: SlotSource::Auto,
            });
            clock = slot_end;
        }
    }

    slots
}

fn time_of_day(minutes: u32) -> Option<NaiveTime> {
    if minutes >= MINUTES_PER_DAY {
        return None;
    }
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn backlog(count: usize) -> Vec<Task> {
        (0..count)
            .map(|index| Task {
                id: index as i64 + 1,
                owner_id: 1,
                title: format!("task-{index}"),
                description: None,
                priority: 1,
                deadline: NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date"),
                completed: false,
                estimated_minutes: 60,
            })
            .collect()
    }

    fn hhmm(slot: &ScheduleSlot) -> (String, String) {
        (
            slot.start_time.format("%H:%M").to_string(),
            slot.end_time.format("%H:%M").to_string(),
        )
    }

    /// Week of Monday 2025-04-28.
    fn plan_week() -> PlanWeek {
        PlanWeek {
            week_start: NaiveDate::from_ymd_opt(2025, 4, 28).expect("valid date"),
            deadline_policy: DeadlinePolicy::DropUnmeetable,
        }
    }

    fn pack(window: PackWindow, days: &[Weekday], tasks: &[Task]) -> Vec<ScheduleSlot> {
        pack_slots(1, window, days, tasks, plan_week())
    }

    fn window(start_hour: u8, end_hour: u8, slot_hours: u8) -> PackWindow {
        PackWindow {
            start_hour,
            end_hour,
            slot_hours,
        }
    }

    #[test]
    fn single_day_window_fills_contiguous_hours() {
        let tasks = backlog(5);
        let slots = pack(window(9, 12, 1), &[Weekday::Mon], &tasks);

        let times = slots.iter().map(hhmm).collect::<Vec<_>>();
        assert_eq!(
            times,
            vec![
                ("09:00".to_string(), "10:00".to_string()),
                ("10:00".to_string(), "11:00".to_string()),
                ("11:00".to_string(), "12:00".to_string()),
            ]
        );
        assert_eq!(
            slots.iter().map(|slot| slot.task_id).collect::<Vec<_>>(),
            vec![Some(1), Some(2), Some(3)]
        );
        assert!(slots.iter().all(|slot| slot.source == SlotSource::Auto));
    }

    #[test]
    fn cursor_carries_across_days() {
        let tasks = backlog(5);
        let days = [Weekday::Mon, Weekday::Tue, Weekday::Wed];
        let slots = pack(window(9, 11, 1), &days, &tasks);

        assert_eq!(slots.len(), 5);
        assert_eq!(slots[4].day, Weekday::Wed);
        assert_eq!(slots[4].task_id, Some(5));
        assert_eq!(hhmm(&slots[4]).0, "09:00");
    }

    #[test]
    fn two_day_window_places_last_task_on_second_day() {
        let tasks = backlog(5);
        let slots = pack(window(9, 11, 1), &[Weekday::Mon, Weekday::Tue], &tasks);
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[2].day, Weekday::Tue);
        assert_eq!(slots[2].task_id, Some(3));
    }

    #[test]
    fn degenerate_inputs_produce_no_slots() {
        let tasks = backlog(3);
        assert!(pack(window(10, 9, 1), &[Weekday::Mon], &tasks).is_empty());
        assert!(pack(window(9, 9, 1), &[Weekday::Mon], &tasks).is_empty());
        assert!(pack(window(9, 17, 1), &[], &tasks).is_empty());
        assert!(pack(window(9, 17, 1), &[Weekday::Mon], &[]).is_empty());
    }

    #[test]
    fn last_slot_may_overrun_window_but_not_midnight() {
        let tasks = backlog(4);
        let slots = pack(window(9, 12, 2), &[Weekday::Mon], &tasks);
        assert_eq!(
            slots.iter().map(hhmm).collect::<Vec<_>>(),
            vec![
                ("09:00".to_string(), "11:00".to_string()),
                ("11:00".to_string(), "13:00".to_string()),
            ]
        );

        let late = pack(window(20, 23, 3), &[Weekday::Fri], &tasks);
        assert_eq!(late.len(), 1);
        assert_eq!(hhmm(&late[0]), ("20:00".to_string(), "23:00".to_string()));
    }

    #[test]
    fn repeated_day_restarts_clock() {
        let tasks = backlog(4);
        let slots = pack(window(9, 11, 1), &[Weekday::Mon, Weekday::Mon], &tasks);
        assert_eq!(slots.len(), 4);
        assert_eq!(hhmm(&slots[2]).0, "09:00");
        assert_eq!(slots[2].day, Weekday::Mon);
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn task_is_not_placed_on_a_day_past_its_deadline() {
        let mut tasks = backlog(3);
        tasks[0].deadline = date("2025-04-30");
        tasks[1].deadline = date("2025-04-30");

        let slots = pack(window(9, 10, 1), &[Weekday::Mon, Weekday::Fri], &tasks);
        let placed = slots
            .iter()
            .map(|slot| (slot.day, slot.task_id))
            .collect::<Vec<_>>();
        assert_eq!(placed, vec![(Weekday::Mon, Some(1)), (Weekday::Fri, Some(3))]);
    }

    #[test]
    fn day_stops_when_no_pending_task_fits() {
        let mut tasks = backlog(2);
        // Monday 2025-04-28: the first slot ends 10:00, after the deadline instant.
        tasks[0].deadline = date("2025-04-28");
        tasks[1].deadline = date("2025-04-28");
        assert!(pack(window(9, 12, 1), &[Weekday::Mon, Weekday::Tue], &tasks).is_empty());
    }

    #[test]
    fn ignore_policy_keeps_strict_backlog_order() {
        let mut tasks = backlog(2);
        tasks[0].deadline = date("2025-04-28");
        let week = PlanWeek {
            deadline_policy: DeadlinePolicy::Ignore,
            ..plan_week()
        };
        let slots = pack_slots(1, window(9, 11, 1), &[Weekday::Fri], &tasks, week);
        assert_eq!(
            slots.iter().map(|slot| slot.task_id).collect::<Vec<_>>(),
            vec![Some(1), Some(2)]
        );
    }

    #[test]
    fn midnight_cutoff_yields_nothing_for_late_long_slots() {
        let tasks = backlog(2);
        assert!(pack(window(22, 23, 2), &[Weekday::Sat], &tasks).is_empty());
    }

    proptest! {
        #[test]
        fn packed_slots_never_overlap_and_use_each_task_once(
            start_hour in 0u8..=23,
            end_hour in 0u8..=23,
            slot_hours in 1u8..=8,
            task_count in 0usize..40,
            day_indexes in proptest::collection::vec(0u32..7, 0..7),
        ) {
            let week = [
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ];
            let days = day_indexes
                .iter()
                .map(|index| week[*index as usize])
                .collect::<Vec<_>>();
            let tasks = backlog(task_count);
            let slots = pack(window(start_hour, end_hour, slot_hours), &days, &tasks);

            prop_assert!(slots.len() <= task_count);
            let task_ids = slots.iter().filter_map(|slot| slot.task_id).collect::<HashSet<_>>();
            prop_assert_eq!(task_ids.len(), slots.len());

            let mut previous: Option<&ScheduleSlot> = None;
            for slot in &slots {
                prop_assert!(slot.end_time > slot.start_time);
                if let Some(previous) = previous {
                    if previous.day == slot.day && slot.start_time > previous.start_time {
                        prop_assert!(slot.start_time >= previous.end_time);
                    }
                }
                previous = Some(slot);
            }

            let expected_ids = (1..=slots.len() as i64).map(Some).collect::<Vec<_>>();
            prop_assert_eq!(slots.iter().map(|slot| slot.task_id).collect::<Vec<_>>(), expected_ids);
        }
    }
}
