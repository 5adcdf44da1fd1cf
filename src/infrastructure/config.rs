use crate::domain::days::{DayExpansionPolicy, DayMatching, DuplicateDays};
use crate::domain::models::{validate_slot_hours, MIN_SLOT_HOURS};
use crate::domain::packer::DeadlinePolicy;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const SCHEDULER_JSON: &str = "scheduler.json";
const SUPPORTED_SCHEMA: u64 = 1;
const DEFAULT_PLANNER_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub timezone: Tz,
    pub day_policy: DayExpansionPolicy,
    pub deadline_policy: DeadlinePolicy,
    pub default_slot_hours: u8,
    pub planner: Option<PlannerCommandSettings>,
}

/// Shell command that receives a planning prompt on stdin and prints a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerCommandSettings {
    pub command: String,
    pub timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            day_policy: DayExpansionPolicy::default(),
            deadline_policy: DeadlinePolicy::default(),
            default_slot_hours: MIN_SLOT_HOURS,
            planner: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchedulerFile {
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    day_matching: DayMatching,
    #[serde(default)]
    duplicate_days: DuplicateDays,
    #[serde(default)]
    deadline_policy: DeadlinePolicy,
    #[serde(default)]
    default_slot_hours: Option<u8>,
    #[serde(default)]
    planner_command: Option<String>,
    #[serde(default)]
    planner_timeout_secs: Option<u64>,
}

fn default_scheduler_config() -> serde_json::Value {
    serde_json::json!({
        "schema": SUPPORTED_SCHEMA,
        "timezone": "UTC",
        "dayMatching": "exact",
        "duplicateDays": "collapse",
        "deadlinePolicy": "drop_unmeetable",
        "defaultSlotHours": MIN_SLOT_HOURS
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(SCHEDULER_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_scheduler_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_scheduler_settings(config_dir: &Path) -> Result<SchedulerSettings, InfraError> {
    let path = config_dir.join(SCHEDULER_JSON);
    let file: SchedulerFile = serde_json::from_value(read_config(&path)?)?;

    let timezone = match file
        .timezone
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(name) => name.parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("invalid timezone '{name}' in {}: {error}", path.display()))
        })?,
        None => Tz::UTC,
    };

    let default_slot_hours = file.default_slot_hours.unwrap_or(MIN_SLOT_HOURS);
    validate_slot_hours(default_slot_hours, "defaultSlotHours").map_err(InfraError::InvalidConfig)?;

    let planner_timeout_secs = file.planner_timeout_secs.unwrap_or(DEFAULT_PLANNER_TIMEOUT_SECS);
    if planner_timeout_secs == 0 {
        return Err(InfraError::InvalidConfig(
            "plannerTimeoutSecs must be greater than 0".to_string(),
        ));
    }
    let planner = file
        .planner_command
        .map(|command| command.trim().to_string())
        .filter(|command| !command.is_empty())
        .map(|command| PlannerCommandSettings {
            command,
            timeout: Duration::from_secs(planner_timeout_secs),
        });

    Ok(SchedulerSettings {
        timezone,
        day_policy: DayExpansionPolicy {
            matching: file.day_matching,
            duplicates: file.duplicate_days,
        },
        deadline_policy: file.deadline_policy,
        default_slot_hours,
        planner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_written_once_and_load_cleanly() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");

        let settings = load_scheduler_settings(dir.path()).expect("load settings");
        assert_eq!(settings, SchedulerSettings::default());

        fs::write(
            dir.path().join(SCHEDULER_JSON),
            r#"{"schema":1,"timezone":"Europe/Istanbul","duplicateDays":"repeat","deadlinePolicy":"ignore","defaultSlotHours":2,"plannerCommand":"./plan.sh","plannerTimeoutSecs":5}"#,
        )
        .expect("overwrite config");
        ensure_default_configs(dir.path()).expect("keep existing");

        let settings = load_scheduler_settings(dir.path()).expect("load settings");
        assert_eq!(settings.timezone, chrono_tz::Europe::Istanbul);
        assert_eq!(settings.day_policy.duplicates, DuplicateDays::Repeat);
        assert_eq!(settings.day_policy.matching, DayMatching::Exact);
        assert_eq!(settings.deadline_policy, DeadlinePolicy::Ignore);
        assert_eq!(settings.default_slot_hours, 2);
        assert_eq!(
            settings.planner,
            Some(PlannerCommandSettings {
                command: "./plan.sh".to_string(),
                timeout: Duration::from_secs(5),
            })
        );
    }

    #[test]
    fn rejects_bad_schema_timezone_and_slot_hours() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(SCHEDULER_JSON);

        fs::write(&path, r#"{"schema":2}"#).expect("write");
        assert!(matches!(
            load_scheduler_settings(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));

        fs::write(&path, r#"{"schema":1,"timezone":"Mars/Olympus"}"#).expect("write");
        assert!(matches!(
            load_scheduler_settings(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));

        fs::write(&path, r#"{"schema":1,"defaultSlotHours":12}"#).expect("write");
        assert!(matches!(
            load_scheduler_settings(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));

        fs::write(&path, r#"{"schema":1,"plannerCommand":"x","plannerTimeoutSecs":0}"#)
            .expect("write");
        assert!(matches!(
            load_scheduler_settings(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
