use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use docket_core::suggest::{SuggestInput, Suggestion};
use futures::Stream;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::{ApiJson, ApiQuery};
use crate::auth::Owner;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::weather::{WeatherQuery, WeatherReport, fetch_weather};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

#[derive(Debug, Serialize)]
pub struct SuggestionBody {
    pub suggestion: Suggestion,
}

pub async fn suggest(
    Owner(_owner): Owner,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<SuggestInput>,
) -> Json<SuggestionBody> {
    let frame = state.service.day_frame();
    Json(SuggestionBody {
        suggestion: state.suggester.suggest(&input, &frame),
    })
}

pub async fn weather(
    Owner(_owner): Owner,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WeatherQuery>,
) -> ApiResult<Json<WeatherReport>> {
    let source = state
        .weather
        .clone()
        .ok_or(ApiError::Unavailable("Missing weather api key"))?;
    let report = fetch_weather(source.as_ref(), &query, state.service.timezone()).await?;
    Ok(Json(report))
}

/// Server-sent `change` events for the caller's own mutations.
pub async fn events(
    Owner(owner): Owner,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(%owner, "event stream opened");
    let rx = state.service.bus().subscribe();

    let stream = futures::stream::unfold((rx, owner), |(mut rx, owner)| async move {
        loop {
            match rx.recv().await {
                Ok(change) if change.owner == owner => {
                    let event = Event::default()
                        .event("change")
                        .json_data(&change)
                        .unwrap_or_else(|_| Event::default().event("change"));
                    return Some((Ok::<_, Infallible>(event), (rx, owner)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%owner, skipped, "event stream lagged");
                    let event = Event::default().event("resync");
                    return Some((Ok::<_, Infallible>(event), (rx, owner)));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
