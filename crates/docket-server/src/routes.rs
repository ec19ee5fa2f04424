use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, patch, post, put};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers::{accounts, lists, misc, tasks};
use crate::state::AppState;

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health", get(misc::health))
        .route("/api/auth/register", post(accounts::register))
        .route("/api/auth/login", post(accounts::login))
        .route(
            "/api/tasks",
            get(tasks::list_tasks)
                .post(tasks::create_task)
                .delete(tasks::delete_by_category),
        )
        .route("/api/tasks/view", get(tasks::view_tasks))
        .route("/api/tasks/summary", get(tasks::summary))
        .route("/api/tasks/reorder", post(tasks::reorder))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/{id}/toggle", patch(tasks::toggle_task))
        .route(
            "/api/tasks/{id}/subtasks/{subtask_id}/toggle",
            patch(tasks::toggle_subtask),
        )
        .route("/api/lists", get(lists::list_lists).post(lists::create_list))
        .route(
            "/api/lists/{id}",
            put(lists::update_list).delete(lists::delete_list),
        )
        .route("/api/ai/suggest", post(misc::suggest))
        .route("/api/weather", get(misc::weather))
        .route("/api/events", get(misc::events))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%origin, error = %err, "ignoring invalid cors origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
