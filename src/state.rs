//! Application state: the in-memory session store, prompts, quiz settings,
//! and the optional generation client.
//!
//! Sessions live entirely in memory and disappear on disconnect or restart.
//! Each WebSocket connection (or HTTP caller) owns one session by id; all
//! mutation goes through short critical sections here while generation calls
//! await outside the lock (see `logic`).

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::{load_agent_config_from_env, Prompts, QuizSettings};
use crate::genai::OpenAI;
use crate::session::QuizSession;

#[derive(Clone)]
pub struct AppState {
  pub sessions: Arc<RwLock<HashMap<String, QuizSession>>>,
  pub openai: Option<OpenAI>,
  pub prompts: Prompts,
  pub quiz: QuizSettings,
}

impl AppState {
  /// Build state from env: load config, init the generation client.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_agent_config_from_env().unwrap_or_default();

    let openai = OpenAI::from_env();
    if let Some(oa) = &openai {
      info!(target: "mind_mirror", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "generation client enabled");
    } else {
      info!(target: "mind_mirror", "generation client disabled (no OPENAI_API_KEY); quiz starts will fail");
    }
    info!(
      target: "quiz",
      questions_per_round = cfg.quiz.questions_per_round,
      failure_reset_delay_secs = cfg.quiz.failure_reset_delay_secs,
      "quiz settings loaded"
    );

    Self {
      sessions: Arc::new(RwLock::new(HashMap::new())),
      openai,
      prompts: cfg.prompts,
      quiz: cfg.quiz,
    }
  }

  pub fn failure_reset_delay(&self) -> Duration {
    Duration::from_secs(self.quiz.failure_reset_delay_secs)
  }

  /// Create a fresh Idle session and return its id.
  #[instrument(level = "info", skip(self))]
  pub async fn create_session(&self) -> String {
    let id = Uuid::new_v4().to_string();
    let session = QuizSession::new(self.quiz.questions_per_round);
    self.sessions.write().await.insert(id.clone(), session);
    info!(target: "quiz", session = %id, "session created");
    id
  }

  /// Drop a session entirely (connection closed).
  #[instrument(level = "debug", skip(self), fields(session = %id))]
  pub async fn remove_session(&self, id: &str) {
    self.sessions.write().await.remove(id);
    info!(target: "quiz", session = %id, "session removed");
  }

  /// Read-only clone of a session's current state.
  pub async fn session_state(&self, id: &str) -> Option<QuizSession> {
    self.sessions.read().await.get(id).cloned()
  }

  /// Run a closure against a session under the write lock.
  /// Returns None if the id is unknown.
  pub async fn with_session<R>(
    &self,
    id: &str,
    f: impl FnOnce(&mut QuizSession) -> R,
  ) -> Option<R> {
    let mut sessions = self.sessions.write().await;
    sessions.get_mut(id).map(f)
  }
}
