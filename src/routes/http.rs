//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Invalid events and unknown sessions come back as 409/404 with a message.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::logic::{self, QuizError};
use crate::protocol::*;
use crate::rounds::ROUND_THEMES;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

/// The static round catalog (titles/descriptions for the client).
#[instrument(level = "info")]
pub async fn http_get_rounds() -> impl IntoResponse {
  Json(ROUND_THEMES)
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let session_id = state.create_session().await;
  info!(target: "quiz", session = %session_id, "HTTP session created");
  Json(SessionCreatedOut { session_id })
}

#[instrument(level = "info", skip(state), fields(session = %id))]
pub async fn http_get_snapshot(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  reply(logic::current_snapshot(&state, &id).await)
}

#[instrument(level = "info", skip(state), fields(session = %id))]
pub async fn http_post_start(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  reply(logic::start_quiz(&state, &id).await)
}

#[instrument(level = "info", skip(state), fields(session = %id))]
pub async fn http_post_continue(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  reply(logic::advance(&state, &id).await)
}

#[instrument(level = "info", skip(state, body), fields(session = %id, option = %body.option_id))]
pub async fn http_post_select(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SelectIn>,
) -> impl IntoResponse {
  reply(logic::choose(&state, &id, &body.option_id).await)
}

#[instrument(level = "info", skip(state), fields(session = %id))]
pub async fn http_post_abandon(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  reply(logic::reset_session(&state, &id).await)
}

#[instrument(level = "info", skip(state), fields(session = %id))]
pub async fn http_post_restart(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  reply(logic::reset_session(&state, &id).await)
}

fn reply(result: Result<SessionSnapshot, QuizError>) -> axum::response::Response {
  match result {
    Ok(snap) => Json(snap).into_response(),
    Err(e) => {
      let status = match &e {
        QuizError::UnknownSession(_) => StatusCode::NOT_FOUND,
        QuizError::InvalidEvent(_) => StatusCode::CONFLICT,
      };
      (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_session_maps_to_404_and_invalid_event_to_409() {
    let not_found = reply(Err(QuizError::UnknownSession("nope".into())));
    assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

    let conflict = reply(Err(QuizError::InvalidEvent(
      "event 'continue' is not valid while Idle".into(),
    )));
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
  }
}
