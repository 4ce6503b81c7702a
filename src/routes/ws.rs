//! WebSocket upgrade + message loop. Each connection owns one quiz session,
//! created on upgrade and dropped on disconnect. Client messages are parsed
//! as JSON and forwarded to core logic; we reply with one JSON message per
//! request.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
  info!(target: "mind_mirror", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let session_id = state.create_session().await;
  info!(target: "mind_mirror", session = %session_id, "WebSocket connected");

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "mind_mirror", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &session_id).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) })
            .to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "mind_mirror", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }

  state.remove_session(&session_id).await;
  info!(target: "mind_mirror", session = %session_id, "WebSocket disconnected");
}

#[instrument(level = "info", skip(state), fields(session = %session_id))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session_id: &str,
) -> ServerWsMessage {
  let result = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,
    ClientWsMessage::StartQuiz => start_quiz(state, session_id).await,
    ClientWsMessage::Continue => advance(state, session_id).await,
    ClientWsMessage::SelectOption { option_id } => choose(state, session_id, &option_id).await,
    // Confirmation for abandon happens client-side; both events are a full reset here.
    ClientWsMessage::Abandon | ClientWsMessage::Restart => {
      reset_session(state, session_id).await
    }
    ClientWsMessage::Snapshot => current_snapshot(state, session_id).await,
  };

  match result {
    Ok(session) => ServerWsMessage::State { session },
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}
