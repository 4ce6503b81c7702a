//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! These drive the quiz state machine through its async edges: they take a
//! session through a synchronous transition under the lock, run the
//! generation call with the lock released, and apply the completion only if
//! the session epoch is unchanged (a reset/abandon in the meantime makes the
//! completion stale, and stale completions are dropped).
//!
//! Every generation failure collapses to one user-visible message; the
//! session returns to Idle automatically after the configured delay unless
//! the user resets it first.

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::domain::{ArchetypeResult, Question};
use crate::genai::GenAiError;
use crate::protocol::{snapshot, SessionSnapshot};
use crate::rounds;
use crate::session::SelectOutcome;
use crate::state::AppState;

/// The single user-visible failure message. The client gets one recovery
/// action, not a taxonomy; detail goes to the logs.
pub const GENERATION_FAILURE_MSG: &str =
  "The narrative thread has snapped. Let us try to mend it...";

/// Wire-level rejections. The split matters to HTTP status mapping:
/// an unknown session is 404, an event invalid for the current status is 409.
#[derive(Debug, Error)]
pub enum QuizError {
  #[error("Unknown session: {0}")]
  UnknownSession(String),
  #[error("{0}")]
  InvalidEvent(String),
}

/// Start a fresh run: Idle -> LoadingQuestions, fetch round 1 questions.
#[instrument(level = "info", skip(state), fields(session = %session_id))]
pub async fn start_quiz(state: &AppState, session_id: &str) -> Result<SessionSnapshot, QuizError> {
  let epoch = state
    .with_session(session_id, |s| {
      s.begin_loading().map(|_| s.epoch).map_err(invalid)
    })
    .await
    .ok_or_else(|| unknown_session(session_id))??;

  fetch_round(state, session_id, epoch, 0, &[]).await;
  current_snapshot(state, session_id).await
}

/// Dismiss the round-transition screen: Transitioning -> Answering.
#[instrument(level = "info", skip(state), fields(session = %session_id))]
pub async fn advance(state: &AppState, session_id: &str) -> Result<SessionSnapshot, QuizError> {
  state
    .with_session(session_id, |s| s.enter_round().map_err(invalid))
    .await
    .ok_or_else(|| unknown_session(session_id))??;
  current_snapshot(state, session_id).await
}

/// Record a choice. Depending on position this either stays in Answering,
/// kicks off the next round's fetch, or kicks off the archetype analysis.
#[instrument(level = "info", skip(state), fields(session = %session_id, option = %option_id))]
pub async fn choose(
  state: &AppState,
  session_id: &str,
  option_id: &str,
) -> Result<SessionSnapshot, QuizError> {
  let (outcome, epoch, answers) = state
    .with_session(session_id, |s| {
      s.select_option(option_id)
        .map(|out| (out, s.epoch, s.answers.clone()))
        .map_err(invalid)
    })
    .await
    .ok_or_else(|| unknown_session(session_id))??;

  match outcome {
    SelectOutcome::NextQuestion => {}
    SelectOutcome::RoundComplete { next_round_index } => {
      fetch_round(state, session_id, epoch, next_round_index, &answers).await;
    }
    SelectOutcome::QuizComplete => {
      finalize_archetype(state, session_id, epoch, &answers).await;
    }
  }
  current_snapshot(state, session_id).await
}

/// Abandon or restart: clear everything back to Idle. The wire layer gates
/// user confirmation; here it is authoritative. An in-flight generation is
/// not cancelled, its late completion is simply dropped by the epoch guard.
#[instrument(level = "info", skip(state), fields(session = %session_id))]
pub async fn reset_session(state: &AppState, session_id: &str) -> Result<SessionSnapshot, QuizError> {
  state
    .with_session(session_id, |s| s.reset())
    .await
    .ok_or_else(|| unknown_session(session_id))?;
  info!(target: "quiz", session = %session_id, "session reset to idle");
  current_snapshot(state, session_id).await
}

/// Read-only view of the session for the wire.
pub async fn current_snapshot(
  state: &AppState,
  session_id: &str,
) -> Result<SessionSnapshot, QuizError> {
  state
    .session_state(session_id)
    .await
    .map(|s| snapshot(&s))
    .ok_or_else(|| unknown_session(session_id))
}

fn unknown_session(id: &str) -> QuizError {
  QuizError::UnknownSession(id.to_string())
}

fn invalid(e: crate::session::SessionError) -> QuizError {
  QuizError::InvalidEvent(e.to_string())
}

// --- Generation edges ---

/// Fetch questions for a 0-based round index and feed the completion back
/// into the machine. `epoch` was captured when the session entered
/// LoadingQuestions; a differing epoch at completion time means the session
/// was reset while we awaited, and the result is discarded.
async fn fetch_round(
  state: &AppState,
  session_id: &str,
  epoch: u64,
  round_index: usize,
  answers: &[crate::domain::UserAnswer],
) {
  // round_index comes from the machine, which never exceeds the catalog.
  let theme = match rounds::theme(round_index) {
    Some(t) => t,
    None => {
      error!(target: "quiz", session = %session_id, round_index, "round index outside catalog");
      fail_generation(state, session_id, epoch, "round index outside catalog").await;
      return;
    }
  };

  let result = match &state.openai {
    Some(oa) => {
      oa.generate_round_questions(
        &state.prompts,
        (round_index + 1) as u32,
        theme.name,
        answers,
        state.quiz.questions_per_round,
      )
      .await
    }
    None => Err(GenAiError::Unavailable),
  };

  match result {
    Ok(questions) => {
      if apply_questions(state, session_id, epoch, questions).await {
        info!(target: "quiz", session = %session_id, round = round_index + 1, "round questions ready");
      }
    }
    Err(e) => {
      error!(target: "quiz", session = %session_id, round = round_index + 1, error = %e, "question generation failed");
      fail_generation(state, session_id, epoch, &e.to_string()).await;
    }
  }
}

/// Run the archetype analysis for a completed session.
async fn finalize_archetype(
  state: &AppState,
  session_id: &str,
  epoch: u64,
  answers: &[crate::domain::UserAnswer],
) {
  let result = match &state.openai {
    Some(oa) => oa.analyze_archetype(&state.prompts, answers).await,
    None => Err(GenAiError::Unavailable),
  };

  match result {
    Ok(archetype) => {
      if apply_archetype(state, session_id, epoch, archetype).await {
        info!(target: "quiz", session = %session_id, "archetype revealed");
      }
    }
    Err(e) => {
      error!(target: "quiz", session = %session_id, error = %e, "archetype synthesis failed");
      fail_generation(state, session_id, epoch, &e.to_string()).await;
    }
  }
}

/// Adopt a finished question batch, unless the session was reset while the
/// call was in flight (epoch mismatch): then the batch is stale and dropped.
/// Returns whether the batch was adopted.
async fn apply_questions(
  state: &AppState,
  session_id: &str,
  epoch: u64,
  questions: Vec<Question>,
) -> bool {
  state
    .with_session(session_id, |s| {
      if s.epoch != epoch {
        warn!(target: "quiz", session = %session_id, "dropping stale question batch (session was reset)");
        return false;
      }
      match s.questions_ready(questions) {
        Ok(()) => true,
        Err(e) => {
          error!(target: "quiz", session = %session_id, error = %e, "could not adopt questions");
          false
        }
      }
    })
    .await
    .unwrap_or(false)
}

/// Same stale-completion guard for the archetype result.
async fn apply_archetype(
  state: &AppState,
  session_id: &str,
  epoch: u64,
  archetype: ArchetypeResult,
) -> bool {
  state
    .with_session(session_id, |s| {
      if s.epoch != epoch {
        warn!(target: "quiz", session = %session_id, "dropping stale archetype (session was reset)");
        return false;
      }
      match s.analysis_ready(archetype) {
        Ok(()) => true,
        Err(e) => {
          error!(target: "quiz", session = %session_id, error = %e, "could not adopt archetype");
          false
        }
      }
    })
    .await
    .unwrap_or(false)
}

/// Record the failure on the session and schedule the automatic return to
/// Idle. The timer is epoch-guarded: a manual reset before it fires bumps the
/// epoch and the timer does nothing.
async fn fail_generation(state: &AppState, session_id: &str, epoch: u64, detail: &str) {
  let recorded = state
    .with_session(session_id, |s| {
      if s.epoch != epoch {
        return false;
      }
      s.generation_failed(GENERATION_FAILURE_MSG.to_string()).is_ok()
    })
    .await
    .unwrap_or(false);
  if !recorded {
    warn!(target: "quiz", session = %session_id, detail, "failure arrived for a reset session; ignored");
    return;
  }

  let state = state.clone();
  let session_id = session_id.to_string();
  let delay = state.failure_reset_delay();
  tokio::spawn(async move {
    tokio::time::sleep(delay).await;
    state
      .with_session(&session_id, |s| {
        if s.epoch == epoch && s.last_error.is_some() {
          s.reset();
          info!(target: "quiz", session = %session_id, "auto-reset to idle after generation failure");
        }
      })
      .await;
  });
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, sync::Arc, time::Duration};

  use tokio::sync::RwLock;

  use super::*;
  use crate::config::{Prompts, QuizSettings};
  use crate::domain::ChoiceOption;
  use crate::session::QuizStatus;
  use crate::state::AppState;

  /// State with no generation client: every fetch fails with Unavailable,
  /// which exercises the whole failure/recovery path offline.
  fn offline_state(reset_delay_secs: u64) -> AppState {
    AppState {
      sessions: Arc::new(RwLock::new(HashMap::new())),
      openai: None,
      prompts: Prompts::default(),
      quiz: QuizSettings { questions_per_round: 3, failure_reset_delay_secs: reset_delay_secs },
    }
  }

  #[tokio::test]
  async fn start_failure_surfaces_one_message_and_auto_resets() {
    let state = offline_state(1);
    let id = state.create_session().await;

    let snap = start_quiz(&state, &id).await.unwrap();
    assert_eq!(snap.status, QuizStatus::LoadingQuestions);
    assert_eq!(snap.error.as_deref(), Some(GENERATION_FAILURE_MSG));
    assert!(snap.result.is_none());

    // Wait past the configured delay for the scheduled reset to land.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let snap = current_snapshot(&state, &id).await.unwrap();
    assert_eq!(snap.status, QuizStatus::Idle);
    assert!(snap.error.is_none());
    assert_eq!(snap.answers_recorded, 0);
  }

  #[tokio::test]
  async fn manual_reset_beats_the_failure_timer() {
    let state = offline_state(60);
    let id = state.create_session().await;

    start_quiz(&state, &id).await.unwrap();
    let snap = reset_session(&state, &id).await.unwrap();
    assert_eq!(snap.status, QuizStatus::Idle);
    assert!(snap.error.is_none());

    // The pending timer is epoch-guarded; the session stays clean.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snap = current_snapshot(&state, &id).await.unwrap();
    assert_eq!(snap.status, QuizStatus::Idle);
  }

  #[tokio::test]
  async fn events_invalid_for_the_current_status_do_not_mutate() {
    let state = offline_state(60);
    let id = state.create_session().await;

    assert!(advance(&state, &id).await.is_err());
    assert!(choose(&state, &id, "a").await.is_err());
    let snap = current_snapshot(&state, &id).await.unwrap();
    assert_eq!(snap.status, QuizStatus::Idle);
    assert_eq!(snap.answers_recorded, 0);
  }

  #[tokio::test]
  async fn unknown_sessions_are_reported() {
    let state = offline_state(60);
    let err = start_quiz(&state, "nope").await.unwrap_err();
    assert!(matches!(err, QuizError::UnknownSession(_)));
    assert!(current_snapshot(&state, "nope").await.is_err());
  }

  fn late_questions() -> Vec<Question> {
    vec![Question {
      id: "q1".into(),
      text: "What do you do?".into(),
      narrative_context: None,
      options: vec![ChoiceOption { id: "a".into(), text: "Go".into(), weight: "Risk".into() }],
    }]
  }

  #[tokio::test]
  async fn question_batch_arriving_after_reset_is_dropped() {
    let state = offline_state(60);
    let id = state.create_session().await;

    // A fetch goes out; its epoch is captured at dispatch time.
    let in_flight_epoch = state
      .with_session(&id, |s| {
        s.begin_loading().unwrap();
        s.epoch
      })
      .await
      .unwrap();

    // The user abandons while the call is still in flight.
    reset_session(&state, &id).await.unwrap();

    // The late batch must not be adopted.
    assert!(!apply_questions(&state, &id, in_flight_epoch, late_questions()).await);
    let snap = current_snapshot(&state, &id).await.unwrap();
    assert_eq!(snap.status, QuizStatus::Idle);
    assert_eq!(snap.questions_in_round, 0);
    assert!(snap.current_question.is_none());
  }

  #[tokio::test]
  async fn archetype_arriving_after_reset_is_dropped() {
    let state = offline_state(60);
    let id = state.create_session().await;

    let in_flight_epoch = state
      .with_session(&id, |s| {
        s.begin_loading().unwrap();
        s.epoch
      })
      .await
      .unwrap();
    reset_session(&state, &id).await.unwrap();

    let late = ArchetypeResult {
      title: "The Relentless Seeker".into(),
      description: "You walk toward what others flee.".into(),
      traits: vec!["Courage".into()],
    };
    assert!(!apply_archetype(&state, &id, in_flight_epoch, late).await);
    let snap = current_snapshot(&state, &id).await.unwrap();
    assert_eq!(snap.status, QuizStatus::Idle);
    assert!(snap.result.is_none());
  }

  #[tokio::test]
  async fn fresh_completion_with_matching_epoch_is_adopted() {
    let state = offline_state(60);
    let id = state.create_session().await;

    let epoch = state
      .with_session(&id, |s| {
        s.begin_loading().unwrap();
        s.epoch
      })
      .await
      .unwrap();

    assert!(apply_questions(&state, &id, epoch, late_questions()).await);
    let snap = current_snapshot(&state, &id).await.unwrap();
    assert_eq!(snap.status, QuizStatus::Transitioning);
    assert_eq!(snap.questions_in_round, 1);
  }
}
