//! Generation client for the narrative service (OpenAI-compatible
//! chat.completions, JSON-object output).
//!
//! Two call shapes exist: per-round question generation (fast model) and the
//! final archetype synthesis (strong model). Responses are treated as
//! untrusted input: the body must parse as JSON of exactly the declared shape
//! or the whole call fails — no coercion, no partial adoption.
//!
//! Calls are instrumented and log model names, latencies, and response sizes
//! (not contents). We never log the API key.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{ArchetypeResult, Question, UserAnswer};
use crate::rounds::NUM_ROUNDS;
use crate::util::{fill_template, trunc_for_log};

/// Failure surface of the generation client. All variants collapse to one
/// user-visible failure at the session layer; the distinction exists for logs.
#[derive(Debug, Error)]
pub enum GenAiError {
  #[error("generation service not configured (no OPENAI_API_KEY)")]
  Unavailable,
  #[error("request failed: {0}")]
  Http(String),
  #[error("service returned HTTP {status}: {message}")]
  Api { status: u16, message: String },
  #[error("response was not valid JSON: {0}")]
  Parse(String),
  #[error("response did not match the expected shape: {0}")]
  Schema(String),
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  /// Model for per-round question generation.
  pub fast_model: String,
  /// Model for the final archetype synthesis.
  pub strong_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// JSON-constrained chat completion; returns the raw content text.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json_text(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<String, GenAiError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "mind-mirror-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| GenAiError::Http(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_api_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(GenAiError::Api { status, message });
    }

    let body: ChatCompletionResponse =
      res.json().await.map_err(|e| GenAiError::Parse(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "generation usage");
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    Ok(text.trim().to_string())
  }

  // --- High-level operations ---

  /// Generate one round's worth of narrative questions given the answers so
  /// far. The answer history is read-only input, so a retry re-issues an
  /// equivalent prompt.
  #[instrument(
    level = "info",
    skip(self, prompts, answer_history),
    fields(history_len = answer_history.len(), model = %self.fast_model)
  )]
  pub async fn generate_round_questions(
    &self,
    prompts: &Prompts,
    round_number: u32,
    theme_name: &str,
    answer_history: &[UserAnswer],
    questions_per_round: usize,
  ) -> Result<Vec<Question>, GenAiError> {
    let user = build_narrative_prompt(prompts, round_number, theme_name, answer_history, questions_per_round);
    let start = std::time::Instant::now();
    let text = self
      .chat_json_text(&self.fast_model, &prompts.narrative_system, &user, 0.95)
      .await;
    let elapsed = start.elapsed();

    let text = match text {
      Ok(t) => t,
      Err(e) => {
        error!(?elapsed, error = %e, "question generation call failed");
        return Err(e);
      }
    };

    let questions = parse_questions_payload(&text)?;
    if questions.len() != questions_per_round {
      warn!(got = questions.len(), expected = questions_per_round, "question count differs from configuration");
    }
    info!(?elapsed, count = questions.len(), "round questions generated");
    Ok(questions)
  }

  /// Synthesize the final archetype from the full answer history. Called
  /// exactly once per completed session.
  #[instrument(level = "info", skip(self, prompts, all_answers), fields(answers = all_answers.len(), model = %self.strong_model))]
  pub async fn analyze_archetype(
    &self,
    prompts: &Prompts,
    all_answers: &[UserAnswer],
  ) -> Result<ArchetypeResult, GenAiError> {
    let user = fill_template(
      &prompts.archetype_user_template,
      &[("journey", &journey_summary(all_answers))],
    );
    let start = std::time::Instant::now();
    let text = self
      .chat_json_text(&self.strong_model, &prompts.archetype_system, &user, 0.8)
      .await;
    let elapsed = start.elapsed();

    let text = match text {
      Ok(t) => t,
      Err(e) => {
        error!(?elapsed, error = %e, "archetype synthesis call failed");
        return Err(e);
      }
    };

    let result = parse_archetype_payload(&text)?;
    info!(?elapsed, title = %result.title, traits = result.traits.len(), "archetype synthesized");
    Ok(result)
  }
}

// --- Prompt construction (pure functions of their input) ---

/// Serialize prior choices, one per line, or the fixed opening sentence when
/// the journey has no history yet.
pub fn story_so_far(answers: &[UserAnswer]) -> String {
  if answers.is_empty() {
    "The protagonist has just begun their journey.".to_string()
  } else {
    answers
      .iter()
      .map(|a| format!("Action: {}", a.selected_option_text))
      .collect::<Vec<_>>()
      .join("\n")
  }
}

/// Serialize the full journey for archetype synthesis, in original order.
pub fn journey_summary(answers: &[UserAnswer]) -> String {
  answers
    .iter()
    .map(|a| format!("Chapter {}: {} -> Choice: {}", a.round, a.question_text, a.selected_option_text))
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn build_narrative_prompt(
  prompts: &Prompts,
  round_number: u32,
  theme_name: &str,
  answer_history: &[UserAnswer],
  questions_per_round: usize,
) -> String {
  fill_template(
    &prompts.narrative_user_template,
    &[
      ("theme", theme_name),
      ("round_number", &round_number.to_string()),
      ("num_rounds", &NUM_ROUNDS.to_string()),
      ("story_so_far", &story_so_far(answer_history)),
      ("questions_per_round", &questions_per_round.to_string()),
    ],
  )
}

// --- Response validation (reject, never coerce) ---

pub fn parse_questions_payload(text: &str) -> Result<Vec<Question>, GenAiError> {
  #[derive(Deserialize)]
  struct Wrapped {
    questions: Vec<Question>,
  }

  // json_object mode constrains output to a top-level object, so the prompt
  // asks for {"questions": [...]}; a bare array is tolerated as well.
  let trimmed = text.trim();
  let questions: Vec<Question> = if trimmed.starts_with('[') {
    serde_json::from_str(trimmed).map_err(|e| GenAiError::Parse(e.to_string()))?
  } else {
    serde_json::from_str::<Wrapped>(trimmed)
      .map_err(|e| GenAiError::Parse(e.to_string()))?
      .questions
  };
  if questions.is_empty() {
    return Err(GenAiError::Schema("empty question list".into()));
  }
  for q in &questions {
    if q.options.is_empty() {
      return Err(GenAiError::Schema(format!("question '{}' has no options", q.id)));
    }
  }
  Ok(questions)
}

pub fn parse_archetype_payload(text: &str) -> Result<ArchetypeResult, GenAiError> {
  let result: ArchetypeResult = serde_json::from_str(text.trim())
    .map_err(|e| GenAiError::Parse(e.to_string()))?;
  if result.traits.is_empty() {
    return Err(GenAiError::Schema("archetype has no traits".into()));
  }
  Ok(result)
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq {
  role: String,
  content: String,
}
#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")]
  r#type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
}
#[derive(Deserialize)]
struct ChatMessageResp {
  content: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)]
  prompt_tokens: Option<u32>,
  #[serde(default)]
  completion_tokens: Option<u32>,
  #[serde(default)]
  total_tokens: Option<u32>,
}

/// Try to extract a clean error message from the service's error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Prompts;

  fn answer(round: u32, question: &str, choice: &str) -> UserAnswer {
    UserAnswer {
      question_id: format!("q-{round}"),
      question_text: question.into(),
      selected_option_text: choice.into(),
      round,
    }
  }

  #[test]
  fn story_so_far_empty_history_uses_opening_sentence() {
    assert_eq!(story_so_far(&[]), "The protagonist has just begun their journey.");
  }

  #[test]
  fn story_so_far_renders_one_action_per_line() {
    let answers = vec![answer(1, "What now?", "Push through"), answer(1, "And then?", "Wait")];
    assert_eq!(story_so_far(&answers), "Action: Push through\nAction: Wait");
  }

  #[test]
  fn journey_summary_preserves_order_and_rounds() {
    let answers = vec![
      answer(1, "What do you do?", "Push through"),
      answer(2, "Who do you trust?", "No one"),
    ];
    let s = journey_summary(&answers);
    assert_eq!(
      s,
      "Chapter 1: What do you do? -> Choice: Push through\nChapter 2: Who do you trust? -> Choice: No one"
    );
  }

  #[test]
  fn prompt_construction_is_idempotent() {
    let prompts = Prompts::default();
    let answers = vec![answer(1, "What do you do?", "Push through")];
    let a = build_narrative_prompt(&prompts, 2, "Chapter II: The Threshold", &answers, 3);
    let b = build_narrative_prompt(&prompts, 2, "Chapter II: The Threshold", &answers, 3);
    assert_eq!(a, b);
    assert!(a.contains("Chapter II: The Threshold"));
    assert!(a.contains("Round 2 of 5"));
    assert!(a.contains("Action: Push through"));
  }

  #[test]
  fn valid_questions_payload_parses() {
    let body = r#"[
      {"id":"q1","text":"What do you do?","narrativeContext":"The mist parts.",
       "options":[{"id":"a","text":"Push through","weight":"Risk-taking"}]},
      {"id":"q2","text":"And now?","options":[{"id":"a","text":"Wait","weight":"Caution"}]}
    ]"#;
    let qs = parse_questions_payload(body).unwrap();
    assert_eq!(qs.len(), 2);
    assert_eq!(qs[0].narrative_context.as_deref(), Some("The mist parts."));
    assert!(qs[1].narrative_context.is_none());
  }

  #[test]
  fn object_wrapped_question_list_is_accepted() {
    let body = r#"{"questions":[
      {"id":"q1","text":"What do you do?","narrativeContext":"The mist parts.",
       "options":[{"id":"a","text":"Push through","weight":"Risk-taking"}]}
    ]}"#;
    let qs = parse_questions_payload(body).unwrap();
    assert_eq!(qs.len(), 1);
    assert_eq!(qs[0].id, "q1");
  }

  #[test]
  fn object_wrapped_empty_list_is_rejected() {
    assert!(matches!(
      parse_questions_payload(r#"{"questions":[]}"#),
      Err(GenAiError::Schema(_))
    ));
  }

  #[test]
  fn object_without_questions_field_is_a_parse_error() {
    assert!(matches!(
      parse_questions_payload(r#"{"items":[]}"#),
      Err(GenAiError::Parse(_))
    ));
  }

  #[test]
  fn non_json_body_is_a_parse_error() {
    assert!(matches!(parse_questions_payload("not json"), Err(GenAiError::Parse(_))));
    assert!(matches!(parse_archetype_payload("not json"), Err(GenAiError::Parse(_))));
  }

  #[test]
  fn missing_required_field_is_rejected() {
    // "weight" missing on the option.
    let body = r#"[{"id":"q1","text":"?","options":[{"id":"a","text":"Go"}]}]"#;
    assert!(matches!(parse_questions_payload(body), Err(GenAiError::Parse(_))));
  }

  #[test]
  fn empty_options_are_rejected() {
    let body = r#"[{"id":"q1","text":"?","options":[]}]"#;
    assert!(matches!(parse_questions_payload(body), Err(GenAiError::Schema(_))));
  }

  #[test]
  fn empty_question_list_is_rejected() {
    assert!(matches!(parse_questions_payload("[]"), Err(GenAiError::Schema(_))));
  }

  #[test]
  fn archetype_payload_validates_traits() {
    let ok = r#"{"title":"The Relentless Seeker","description":"...","traits":["Courage","Clarity"]}"#;
    let r = parse_archetype_payload(ok).unwrap();
    assert_eq!(r.title, "The Relentless Seeker");

    let empty = r#"{"title":"T","description":"D","traits":[]}"#;
    assert!(matches!(parse_archetype_payload(empty), Err(GenAiError::Schema(_))));

    let missing = r#"{"title":"T","traits":["x"]}"#;
    assert!(matches!(parse_archetype_payload(missing), Err(GenAiError::Parse(_))));
  }

  #[test]
  fn surrounding_whitespace_is_tolerated() {
    let body = "\n  {\"title\":\"T\",\"description\":\"D\",\"traits\":[\"x\"]}  \n";
    assert!(parse_archetype_payload(body).is_ok());
  }
}
