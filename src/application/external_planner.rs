use crate::domain::error::ScheduleError;
use crate::domain::models::Task;
use crate::infrastructure::config::PlannerCommandSettings;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const DEFAULT_PLANNER_NOTES: &str = "User prefers to study in the evenings.";

/// A planner that proposes a week of study sessions for a backlog.
///
/// The returned text is untrusted; callers pass it through
/// [`crate::domain::external::parse_proposal`] before anything is stored.
#[async_trait]
pub trait ExternalPlanner: Send + Sync {
    async fn propose(&self, tasks: &[Task], notes: &str) -> Result<String, InfraError>;
}

pub fn build_planner_prompt(tasks: &[Task], notes: &str) -> String {
    let task_lines = tasks
        .iter()
        .map(|task| {
            format!(
                "- {}: {} (priority: {}, deadline: {})",
                task.title,
                task.description.as_deref().unwrap_or("No description"),
                task.priority,
                task.deadline
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Create a one-week study plan for the tasks below.\n\
         Lower priority numbers are more urgent. No session may end after its task's deadline.\n\n\
         NOTES:\n{notes}\n\n\
         TASKS:\n{task_lines}\n\n\
         Answer with a JSON array only, one object per session:\n\
         [{{\"title\": \"Task title\", \"day\": \"Monday\", \"start_time\": \"10:00\", \"end_time\": \"11:30\"}}]\n"
    )
}

/// Runs a shell command with the prompt on stdin and returns its stdout.
pub struct CommandPlanner {
    settings: PlannerCommandSettings,
}

impl CommandPlanner {
    pub fn new(settings: PlannerCommandSettings) -> Self {
        Self { settings }
    }
}

fn planner_error(message: String) -> InfraError {
    InfraError::Schedule(ScheduleError::ExternalPlan(message))
}

#[async_trait]
impl ExternalPlanner for CommandPlanner {
    async fn propose(&self, tasks: &[Task], notes: &str) -> Result<String, InfraError> {
        let prompt = build_planner_prompt(tasks, notes);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.settings.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command may exit without reading its input.
            let written = match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => stdin.shutdown().await,
                Err(error) => Err(error),
            };
            match written {
                Err(error) if error.kind() != ErrorKind::BrokenPipe => return Err(error.into()),
                _ => {}
            }
        }

        let output = tokio::time::timeout(self.settings.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                planner_error(format!(
                    "planner command timed out after {}s",
                    self.settings.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(planner_error(format!(
                "planner command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(bytes = output.stdout.len(), "planner command finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn backlog() -> Vec<Task> {
        vec![Task {
            id: 1,
            owner_id: 2,
            title: "Thermodynamics".to_string(),
            description: None,
            priority: 1,
            deadline: NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date"),
            completed: false,
            estimated_minutes: 90,
        }]
    }

    fn planner(command: &str, timeout: Duration) -> CommandPlanner {
        CommandPlanner::new(PlannerCommandSettings {
            command: command.to_string(),
            timeout,
        })
    }

    #[test]
    fn prompt_lists_tasks_and_notes() {
        let prompt = build_planner_prompt(&backlog(), "mornings only");
        assert!(prompt.contains("mornings only"));
        assert!(prompt.contains("- Thermodynamics: No description (priority: 1, deadline: 2026-03-02)"));
        assert!(prompt.contains("\"start_time\""));
    }

    #[tokio::test]
    async fn command_receives_prompt_on_stdin() {
        let output = planner("grep -c Thermodynamics", Duration::from_secs(10))
            .propose(&backlog(), DEFAULT_PLANNER_NOTES)
            .await
            .expect("planner output");
        assert_eq!(output.trim(), "1");
    }

    #[tokio::test]
    async fn failing_command_is_an_external_plan_error() {
        let error = planner("echo broken >&2; exit 3", Duration::from_secs(10))
            .propose(&backlog(), DEFAULT_PLANNER_NOTES)
            .await
            .expect_err("command fails");
        assert_eq!(error.code(), "external_plan");
        assert!(error.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let error = planner("cat >/dev/null; sleep 5", Duration::from_millis(200))
            .propose(&backlog(), DEFAULT_PLANNER_NOTES)
            .await
            .expect_err("command times out");
        assert_eq!(error.code(), "external_plan");
    }
}
