pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    auto_plan_impl, clear_slots_impl, complete_task_impl, create_task_impl, delete_slot_impl,
    delete_task_impl, external_plan_impl, get_preferences_impl, list_schedule_impl,
    list_tasks_impl, manual_plan_impl, update_slot_impl, update_task_impl,
    upsert_preferences_impl, AppState,
};
use domain::models::{OwnerId, SlotId, TaskId, TaskUpdate};
use infrastructure::error::InfraError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// One line of the stdin protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
struct TaskIdParams {
    task_id: TaskId,
}

#[derive(Debug, Deserialize)]
struct TaskUpdateParams {
    task_id: TaskId,
    #[serde(flatten)]
    update: TaskUpdate,
}

#[derive(Debug, Deserialize)]
struct SlotIdParams {
    slot_id: SlotId,
}

#[derive(Debug, Deserialize)]
struct SlotUpdateParams {
    slot_id: SlotId,
    start_time: String,
    end_time: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalPlanParams {
    #[serde(default)]
    notes: Option<String>,
}

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, code: &str, message: impl Into<String>) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": {
            "code": code,
            "message": message.into(),
        }
    })
}

fn params<T: DeserializeOwned>(request: &Request) -> Result<T, InfraError> {
    let raw = match &request.params {
        Value::Null => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(raw).map_err(|error| {
        InfraError::validation(format!("invalid params for {}: {error}", request.method))
    })
}

fn required_owner(request: &Request) -> Result<OwnerId, InfraError> {
    request
        .owner_id
        .ok_or_else(|| InfraError::validation(format!("{} requires owner_id", request.method)))
}

/// Runs one request. `Ok(None)` means the method is unknown.
async fn dispatch(state: &AppState, request: &Request) -> Result<Option<Value>, InfraError> {
    if request.method == "ping" {
        return Ok(Some(json!("pong")));
    }

    let owner_id = required_owner(request)?;
    let result = match request.method.as_str() {
        "create_task" => serde_json::to_value(create_task_impl(state, owner_id, params(request)?)?)?,
        "list_tasks" => serde_json::to_value(list_tasks_impl(state, owner_id)?)?,
        "update_task" => {
            let TaskUpdateParams { task_id, update } = params(request)?;
            serde_json::to_value(update_task_impl(state, owner_id, task_id, update)?)?
        }
        "complete_task" => {
            let TaskIdParams { task_id } = params(request)?;
            serde_json::to_value(complete_task_impl(state, owner_id, task_id)?)?
        }
        "delete_task" => {
            let TaskIdParams { task_id } = params(request)?;
            serde_json::to_value(delete_task_impl(state, owner_id, task_id)?)?
        }
        "get_preferences" => serde_json::to_value(get_preferences_impl(state, owner_id)?)?,
        "upsert_preferences" => {
            serde_json::to_value(upsert_preferences_impl(state, owner_id, params(request)?)?)?
        }
        "auto_plan" => serde_json::to_value(auto_plan_impl(state, owner_id, params(request)?)?)?,
        "manual_plan" => {
            serde_json::to_value(manual_plan_impl(state, owner_id, params(request)?)?)?
        }
        "update_slot" => {
            let SlotUpdateParams {
                slot_id,
                start_time,
                end_time,
            } = params(request)?;
            serde_json::to_value(update_slot_impl(
                state, owner_id, slot_id, start_time, end_time,
            )?)?
        }
        "delete_slot" => {
            let SlotIdParams { slot_id } = params(request)?;
            serde_json::to_value(delete_slot_impl(state, owner_id, slot_id)?)?
        }
        "clear_slots" => serde_json::to_value(clear_slots_impl(state, owner_id)?)?,
        "list_schedule" => serde_json::to_value(list_schedule_impl(state, owner_id)?)?,
        "external_plan" => {
            let ExternalPlanParams { notes } = params(request)?;
            serde_json::to_value(external_plan_impl(state, owner_id, notes).await?)?
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

pub async fn handle_request(state: &AppState, request: Request) -> Value {
    match dispatch(state, &request).await {
        Ok(Some(result)) => ok(&request.id, result),
        Ok(None) => err(
            &request.id,
            "not_implemented",
            format!("unknown method: {}", request.method),
        ),
        Err(error) => err(
            &request.id,
            error.code(),
            state.command_error(&request.method, &error),
        ),
    }
}

/// Serves newline-delimited JSON requests from stdin until it closes.
pub async fn run(state: AppState) -> Result<(), InfraError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                tracing::debug!(id = %request.id, method = %request.method, "request received");
                handle_request(&state, request).await
            }
            Err(error) => {
                tracing::warn!(%error, "unparseable request line");
                json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": error.to_string() }
                })
            }
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await?;
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
