//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{ArchetypeResult, Question, RoundTheme};
use crate::rounds;
use crate::session::{QuizSession, QuizStatus};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  StartQuiz,
  Continue,
  SelectOption {
    #[serde(rename = "optionId")]
    option_id: String,
  },
  Abandon,
  Restart,
  Snapshot,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  State { session: SessionSnapshot },
  Error { message: String },
}

/// Read-only view of a session, rebuilt on every reply. The answer list
/// itself is not echoed back (the client made those choices); counts, the
/// current question, and the terminal result are all a renderer needs.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
  pub status: QuizStatus,
  /// 1-indexed round number of the active round.
  pub round_number: u32,
  pub theme: Option<ThemeOut>,
  pub question_index: usize,
  pub questions_in_round: usize,
  pub current_question: Option<Question>,
  pub answers_recorded: usize,
  pub progress_percent: f32,
  pub loading_message: Option<String>,
  pub error: Option<String>,
  pub result: Option<ArchetypeResult>,
}

#[derive(Debug, Serialize)]
pub struct ThemeOut {
  pub id: u32,
  pub name: &'static str,
  pub description: &'static str,
}

impl From<&'static RoundTheme> for ThemeOut {
  fn from(t: &'static RoundTheme) -> Self {
    ThemeOut { id: t.id, name: t.name, description: t.description }
  }
}

/// Build the wire view for a session's current state.
pub fn snapshot(s: &QuizSession) -> SessionSnapshot {
  let theme = rounds::theme(s.round_index);
  let loading_message = match s.status {
    QuizStatus::LoadingQuestions => {
      theme.map(|t| format!("The Story Weaver is drafting {}...", t.name))
    }
    QuizStatus::Analyzing => Some("Calculating the culmination of your choices...".to_string()),
    _ => None,
  };
  let current_question = match s.status {
    QuizStatus::Answering => s.questions.get(s.question_index).cloned(),
    _ => None,
  };

  SessionSnapshot {
    status: s.status,
    round_number: (s.round_index + 1) as u32,
    theme: theme.map(ThemeOut::from),
    question_index: s.question_index,
    questions_in_round: s.questions.len(),
    current_question,
    answers_recorded: s.answers.len(),
    progress_percent: s.progress_percent(),
    loading_message,
    error: s.last_error.clone(),
    result: s.result.clone(),
  }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct SessionCreatedOut {
  #[serde(rename = "sessionId")]
  pub session_id: String,
}

#[derive(Deserialize)]
pub struct SelectIn {
  #[serde(rename = "optionId")]
  pub option_id: String,
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ChoiceOption, Question};

  fn session_with_round() -> QuizSession {
    let mut s = QuizSession::new(3);
    s.begin_loading().unwrap();
    s.questions_ready(vec![Question {
      id: "q1".into(),
      text: "What do you do?".into(),
      narrative_context: None,
      options: vec![ChoiceOption { id: "a".into(), text: "Go".into(), weight: "Risk".into() }],
    }])
    .unwrap();
    s
  }

  #[test]
  fn loading_snapshot_names_the_theme() {
    let mut s = QuizSession::new(3);
    s.begin_loading().unwrap();
    let snap = snapshot(&s);
    assert_eq!(snap.status, QuizStatus::LoadingQuestions);
    assert!(snap.loading_message.unwrap().contains("Chapter I: The Awakening"));
    assert!(snap.current_question.is_none());
  }

  #[test]
  fn answering_snapshot_carries_the_current_question() {
    let mut s = session_with_round();
    s.enter_round().unwrap();
    let snap = snapshot(&s);
    assert_eq!(snap.status, QuizStatus::Answering);
    assert_eq!(snap.current_question.unwrap().id, "q1");
    assert_eq!(snap.round_number, 1);
    assert_eq!(snap.questions_in_round, 1);
  }

  #[test]
  fn transitioning_snapshot_hides_questions() {
    let s = session_with_round();
    let snap = snapshot(&s);
    assert_eq!(snap.status, QuizStatus::Transitioning);
    assert!(snap.current_question.is_none());
    assert!(snap.loading_message.is_none());
  }

  #[test]
  fn client_messages_parse_from_tagged_json() {
    let m: ClientWsMessage =
      serde_json::from_str(r#"{"type":"select_option","optionId":"b"}"#).unwrap();
    assert!(matches!(m, ClientWsMessage::SelectOption { option_id } if option_id == "b"));
    let m: ClientWsMessage = serde_json::from_str(r#"{"type":"start_quiz"}"#).unwrap();
    assert!(matches!(m, ClientWsMessage::StartQuiz));
  }
}
