use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use docket_core::task::{ListPatch, NewList, TaskList};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, blocking};
use crate::auth::Owner;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListsBody {
    pub lists: Vec<TaskList>,
}

#[derive(Debug, Serialize)]
pub struct ListBody {
    pub list: TaskList,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteListQuery {
    pub cascade: Option<String>,
}

impl DeleteListQuery {
    /// `true` (any case) or `1`.
    pub fn cascade(&self) -> bool {
        self.cascade
            .as_deref()
            .map(str::trim)
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }
}

pub async fn list_lists(
    Owner(owner): Owner,
    State(state): State<AppState>,
) -> ApiResult<Json<ListsBody>> {
    let svc = state.service.clone();
    let lists = blocking(move || svc.list_lists(&owner)).await?;
    Ok(Json(ListsBody { lists }))
}

pub async fn create_list(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewList>,
) -> ApiResult<(StatusCode, Json<ListBody>)> {
    let svc = state.service.clone();
    let list = blocking(move || svc.create_list(&owner, input)).await?;
    Ok((StatusCode::CREATED, Json(ListBody { list })))
}

pub async fn update_list(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<ListPatch>,
) -> ApiResult<Json<ListBody>> {
    let svc = state.service.clone();
    let list = blocking(move || svc.update_list(&owner, id, patch)).await?;
    Ok(Json(ListBody { list }))
}

pub async fn delete_list(
    Owner(owner): Owner,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<DeleteListQuery>,
) -> ApiResult<StatusCode> {
    let cascade = query.cascade();
    let svc = state.service.clone();
    blocking(move || svc.delete_list(&owner, id, cascade)).await?;
    Ok(StatusCode::NO_CONTENT)
}
