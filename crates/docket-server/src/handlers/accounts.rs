use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use docket_core::account::{Credentials, Registration, User, UserProfile};
use serde::Serialize;

use super::{ApiJson, blocking};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionBody {
    pub user: UserProfile,
    pub token: String,
}

fn session(state: &AppState, user: &User) -> ApiResult<SessionBody> {
    let token = state
        .jwt
        .issue(&user.owner_id())
        .map_err(docket_core::Error::Store)?;
    Ok(SessionBody {
        user: UserProfile::from(user),
        token,
    })
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<Registration>,
) -> ApiResult<(StatusCode, Json<SessionBody>)> {
    let accounts = state.accounts.clone();
    let user = blocking(move || accounts.register(input)).await?;
    Ok((StatusCode::CREATED, Json(session(&state, &user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<Credentials>,
) -> ApiResult<Json<SessionBody>> {
    let accounts = state.accounts.clone();
    let user = blocking(move || accounts.login(input)).await?;
    Ok(Json(session(&state, &user)?))
}
