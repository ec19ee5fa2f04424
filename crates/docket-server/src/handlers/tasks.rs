use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::NaiveDate;
use docket_core::filter::{Criteria, Scope};
use docket_core::task::{NewTask, Task, TaskPatch, TaskStatus};
use docket_core::view::{ListView, Summary, ViewKind, ViewRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, blocking, non_empty};
use crate::auth::Owner;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query string shared by the task routes. Each route reads the parts it
/// needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskQuery {
    pub category: Option<String>,
    pub completed: Option<String>,
    pub status: Option<String>,
    pub scope: Option<String>,
    pub search: Option<String>,
    pub view: Option<String>,
    pub date: Option<String>,
}

impl TaskQuery {
    pub fn criteria(&self) -> ApiResult<Criteria> {
        let status = non_empty(self.status.as_deref())
            .map(|s| s.parse::<TaskStatus>())
            .transpose()?;
        Ok(Criteria {
            category: non_empty(self.category.as_deref()),
            completed: non_empty(self.completed.as_deref())
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1"),
            status,
            scope: Scope::parse_optional(self.scope.as_deref())?,
            search: non_empty(self.search.as_deref()),
            day: None,
        })
    }

    pub fn view_request(&self) -> ApiResult<ViewRequest> {
        let view = self.view.as_deref().unwrap_or_default().parse::<ViewKind>()?;
        let calendar_selected_date = non_empty(self.date.as_deref())
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| ApiError::BadRequest(format!("invalid date: {raw}")))
            })
            .transpose()?;
        Ok(ViewRequest {
            criteria: self.criteria()?,
            view,
            calendar_selected_date,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TasksBody {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct TaskBody {
    pub task: Task,
}

pub async fn list_tasks(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> ApiResult<Json<TasksBody>> {
    let criteria = query.criteria()?;
    let svc = state.service.clone();
    let tasks = blocking(move || svc.list_tasks(&owner, &criteria)).await?;
    Ok(Json(TasksBody { tasks }))
}

pub async fn view_tasks(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> ApiResult<Json<ListView>> {
    let request = query.view_request()?;
    let svc = state.service.clone();
    let view = blocking(move || svc.list_view(&owner, &request)).await?;
    Ok(Json(view))
}

pub async fn summary(
    Owner(owner): Owner,
    State(state): State<AppState>,
) -> ApiResult<Json<Summary>> {
    let svc = state.service.clone();
    Ok(Json(blocking(move || svc.summary(&owner)).await?))
}

/// `scope` and `category` in the query string describe the view the task
/// is created from.
pub async fn create_task(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TaskQuery>,
    ApiJson(input): ApiJson<NewTask>,
) -> ApiResult<(StatusCode, Json<TaskBody>)> {
    let context = query.criteria()?;
    let svc = state.service.clone();
    let task = blocking(move || svc.create_task(&owner, input, &context)).await?;
    Ok((StatusCode::CREATED, Json(TaskBody { task })))
}

pub async fn get_task(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<TaskBody>> {
    let svc = state.service.clone();
    let task = blocking(move || svc.get_task(&owner, id)).await?;
    Ok(Json(TaskBody { task }))
}

pub async fn update_task(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<TaskPatch>,
) -> ApiResult<Json<TaskBody>> {
    let svc = state.service.clone();
    let task = blocking(move || svc.update_task(&owner, id, patch)).await?;
    Ok(Json(TaskBody { task }))
}

pub async fn toggle_task(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<TaskBody>> {
    let svc = state.service.clone();
    let task = blocking(move || svc.toggle_task(&owner, id)).await?;
    Ok(Json(TaskBody { task }))
}

pub async fn toggle_subtask(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiPath((id, subtask_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<TaskBody>> {
    let svc = state.service.clone();
    let task = blocking(move || svc.toggle_subtask(&owner, id, subtask_id)).await?;
    Ok(Json(TaskBody { task }))
}

pub async fn delete_task(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let svc = state.service.clone();
    blocking(move || svc.delete_task(&owner, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_by_category(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> ApiResult<Json<Value>> {
    let category = query.category.unwrap_or_default();
    let svc = state.service.clone();
    let deleted = blocking(move || svc.delete_tasks_by_category(&owner, &category)).await?;
    Ok(Json(json!({ "deletedCount": deleted })))
}

/// `orderedIds` must be a non-empty array. Entries that are not id strings
/// are skipped like ids of other owners.
pub async fn reorder(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<Json<Value>> {
    let requested = body
        .get("orderedIds")
        .and_then(Value::as_array)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| docket_core::Error::validation("orderedIds is required"))?;
    let ids: Vec<Uuid> = requested
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|raw| Uuid::parse_str(raw.trim()).ok())
        .collect();
    debug!(requested = requested.len(), parsed = ids.len(), "reorder ids");

    let updated = if ids.is_empty() {
        0
    } else {
        let svc = state.service.clone();
        blocking(move || svc.reorder_tasks(&owner, &ids)).await?
    };
    Ok(Json(json!({ "success": true, "updated": updated })))
}
