//! The quiz state machine.
//!
//! A `QuizSession` owns everything one run accumulates: status, round/question
//! cursors, the append-only answer list, and the terminal archetype. All
//! transition methods are synchronous and side-effect free so the machine can
//! be unit-tested without a runtime; the async driver in `logic` calls the
//! generation client and feeds completions back in here.
//!
//! `epoch` guards against stale completions: it is bumped on every reset, and
//! the driver only applies a generation result whose captured epoch still
//! matches. A response that lands after an abandon/restart is discarded.

use thiserror::Error;

use crate::domain::{ArchetypeResult, Question, UserAnswer};
use crate::rounds::NUM_ROUNDS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
  Idle,
  LoadingQuestions,
  Transitioning,
  Answering,
  Analyzing,
  Revealed,
}

#[derive(Debug, Error)]
pub enum SessionError {
  #[error("event '{event}' is not valid while {status:?}")]
  InvalidTransition { event: &'static str, status: QuizStatus },
  #[error("unknown option id '{0}' for the current question")]
  UnknownOption(String),
  #[error("a round needs at least one question")]
  EmptyRound,
}

/// What a successful `select_option` led to.
#[derive(Debug, PartialEq, Eq)]
pub enum SelectOutcome {
  /// More questions remain in this round.
  NextQuestion,
  /// Round exhausted; the driver must fetch questions for `next_round_index`.
  RoundComplete { next_round_index: usize },
  /// Final round exhausted; the driver must request the archetype analysis.
  QuizComplete,
}

#[derive(Clone, Debug)]
pub struct QuizSession {
  pub status: QuizStatus,
  pub round_index: usize,
  pub questions: Vec<Question>,
  pub question_index: usize,
  pub answers: Vec<UserAnswer>,
  pub result: Option<ArchetypeResult>,
  pub last_error: Option<String>,
  pub epoch: u64,
  questions_per_round: usize,
}

impl QuizSession {
  pub fn new(questions_per_round: usize) -> Self {
    Self {
      status: QuizStatus::Idle,
      round_index: 0,
      questions: Vec::new(),
      question_index: 0,
      answers: Vec::new(),
      result: None,
      last_error: None,
      epoch: 0,
      questions_per_round,
    }
  }

  /// Idle -> LoadingQuestions, the start of a fresh run.
  pub fn begin_loading(&mut self) -> Result<(), SessionError> {
    match self.status {
      QuizStatus::Idle => {
        self.status = QuizStatus::LoadingQuestions;
        Ok(())
      }
      status => Err(SessionError::InvalidTransition { event: "start", status }),
    }
  }

  /// A round's questions arrived: adopt them and show the round transition.
  pub fn questions_ready(&mut self, questions: Vec<Question>) -> Result<(), SessionError> {
    match self.status {
      QuizStatus::LoadingQuestions => {
        if questions.is_empty() {
          return Err(SessionError::EmptyRound);
        }
        self.questions = questions;
        self.question_index = 0;
        self.last_error = None;
        self.status = QuizStatus::Transitioning;
        Ok(())
      }
      status => Err(SessionError::InvalidTransition { event: "questions_ready", status }),
    }
  }

  /// User dismissed the round-transition screen.
  pub fn enter_round(&mut self) -> Result<(), SessionError> {
    match self.status {
      QuizStatus::Transitioning => {
        self.status = QuizStatus::Answering;
        Ok(())
      }
      status => Err(SessionError::InvalidTransition { event: "continue", status }),
    }
  }

  /// Record the user's choice for the current question and advance.
  ///
  /// Appends exactly one `UserAnswer` carrying the 1-indexed round that was
  /// active at the moment of selection. On the last question of a round the
  /// round cursor advances; on the last question of the final round the
  /// machine moves to Analyzing and no further questions are fetched.
  pub fn select_option(&mut self, option_id: &str) -> Result<SelectOutcome, SessionError> {
    if self.status != QuizStatus::Answering {
      return Err(SessionError::InvalidTransition { event: "select_option", status: self.status });
    }
    // While Answering, question_index is always in bounds.
    let question = &self.questions[self.question_index];
    let option = question
      .options
      .iter()
      .find(|o| o.id == option_id)
      .ok_or_else(|| SessionError::UnknownOption(option_id.to_string()))?;

    self.answers.push(UserAnswer {
      question_id: question.id.clone(),
      question_text: question.text.clone(),
      selected_option_text: option.text.clone(),
      round: (self.round_index + 1) as u32,
    });

    if self.question_index + 1 < self.questions.len() {
      self.question_index += 1;
      Ok(SelectOutcome::NextQuestion)
    } else if self.round_index + 1 < NUM_ROUNDS {
      self.round_index += 1;
      self.status = QuizStatus::LoadingQuestions;
      Ok(SelectOutcome::RoundComplete { next_round_index: self.round_index })
    } else {
      self.status = QuizStatus::Analyzing;
      Ok(SelectOutcome::QuizComplete)
    }
  }

  /// The archetype arrived: terminal state.
  pub fn analysis_ready(&mut self, result: ArchetypeResult) -> Result<(), SessionError> {
    match self.status {
      QuizStatus::Analyzing => {
        self.result = Some(result);
        self.last_error = None;
        self.status = QuizStatus::Revealed;
        Ok(())
      }
      status => Err(SessionError::InvalidTransition { event: "analysis_ready", status }),
    }
  }

  /// A generation call failed. No partial data is adopted; the session keeps
  /// its current status (with `last_error` set) until the scheduled reset or
  /// a manual abandon takes it back to Idle.
  pub fn generation_failed(&mut self, message: String) -> Result<(), SessionError> {
    match self.status {
      QuizStatus::LoadingQuestions | QuizStatus::Analyzing => {
        self.last_error = Some(message);
        Ok(())
      }
      status => Err(SessionError::InvalidTransition { event: "generation_failed", status }),
    }
  }

  /// Clear everything back to Idle. Valid from any state; used for abandon,
  /// restart, and the automatic failure recovery. Bumps the epoch so any
  /// in-flight generation result is recognized as stale and dropped.
  pub fn reset(&mut self) {
    self.status = QuizStatus::Idle;
    self.round_index = 0;
    self.questions.clear();
    self.question_index = 0;
    self.answers.clear();
    self.result = None;
    self.last_error = None;
    self.epoch += 1;
  }

  /// Derived progress in percent. Presentation-only, never stored.
  pub fn progress_percent(&self) -> f32 {
    let done = self.round_index * self.questions_per_round + self.question_index;
    let total = NUM_ROUNDS * self.questions_per_round;
    (done as f32 / total as f32) * 100.0
  }
}
