//! Domain models for the quiz: round themes, generated questions, recorded
//! answers, and the final archetype.

use serde::{Deserialize, Serialize};

/// One of the five fixed narrative phases. Static catalog data, never mutated.
#[derive(Clone, Debug, Serialize)]
pub struct RoundTheme {
  pub id: u32,
  pub name: &'static str,
  pub description: &'static str,
}

/// A selectable choice on a question. `weight` is an opaque temperament label
/// produced by the model (e.g. "Risk-taking"); the core logic never interprets
/// it and carries it through for display only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChoiceOption {
  pub id: String,
  pub text: String,
  pub weight: String,
}

/// A generated narrative question. `narrative_context` is optional
/// scene-setting text shown before the choice itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub text: String,
  #[serde(rename = "narrativeContext", default)]
  pub narrative_context: Option<String>,
  pub options: Vec<ChoiceOption>,
}

/// One recorded choice. Append-only for the lifetime of a session; `round` is
/// 1-indexed and matches the round that was active when the answer was made.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserAnswer {
  #[serde(rename = "questionId")]
  pub question_id: String,
  #[serde(rename = "questionText")]
  pub question_text: String,
  #[serde(rename = "selectedOptionText")]
  pub selected_option_text: String,
  pub round: u32,
}

/// The final synthesized archetype, produced once per completed session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchetypeResult {
  pub title: String,
  pub description: String,
  pub traits: Vec<String>,
}
