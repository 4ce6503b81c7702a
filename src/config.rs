//! Loading agent configuration (prompts + quiz tuning) from TOML.
//!
//! See `AgentConfig`, `Prompts`, and `QuizSettings` for the expected schema.
//! Everything is defaulted, so the service runs with no config file at all.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub quiz: QuizSettings,
}

/// Quiz tuning. The number of rounds is fixed by the catalog and is not
/// configurable here.
#[derive(Clone, Debug, Deserialize)]
pub struct QuizSettings {
  #[serde(default = "default_questions_per_round")]
  pub questions_per_round: usize,
  /// Seconds to wait before the automatic return to Idle after a generation
  /// failure.
  #[serde(default = "default_failure_reset_delay_secs")]
  pub failure_reset_delay_secs: u64,
}

fn default_questions_per_round() -> usize {
  3
}
fn default_failure_reset_delay_secs() -> u64 {
  3
}

impl Default for QuizSettings {
  fn default() -> Self {
    Self {
      questions_per_round: default_questions_per_round(),
      failure_reset_delay_secs: default_failure_reset_delay_secs(),
    }
  }
}

/// Prompts used by the generation client. Defaults reproduce the Mind Mirror
/// narrative voice; override them in TOML to tune tone/structure.
///
/// Template placeholders (see `util::fill_template`):
///   narrative_user_template: {theme} {round_number} {num_rounds}
///                            {story_so_far} {questions_per_round}
///   archetype_user_template: {journey}
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub narrative_system: String,
  pub narrative_user_template: String,
  pub archetype_system: String,
  pub archetype_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      narrative_system:
        "You are a Master Narrative Designer for a mystical, choice-driven odyssey called 'Mind Mirror'. Respond ONLY with strict JSON.".into(),
      narrative_user_template: concat!(
        "Current Phase: {theme} (Round {round_number} of {num_rounds}).\n\n",
        "The Story So Far:\n{story_so_far}\n\n",
        "TASK: Generate {questions_per_round} consecutive narrative choices (questions) for this chapter. ",
        "The choices should feel like an unfolding story. ",
        "Each question should include a 'narrativeContext' (1-2 sentences) that describes the scene before presenting the options. ",
        "Options should represent different psychological temperaments (Risk-taking, Empathy, Logic, Chaos, etc.).\n\n",
        "Return a JSON object with a single field \"questions\": an array of objects, each with fields ",
        "id (string), text (string), narrativeContext (string), ",
        "options (array of objects with id, text, weight; all strings, all required).\n",
        "Output only valid JSON."
      )
      .into(),
      archetype_system:
        "You are a Psychological Story Weaver. A traveler has completed an odyssey. Based on the path they carved, reveal their true Inner Archetype. Respond ONLY with strict JSON.".into(),
      archetype_user_template: concat!(
        "The Traveler's Journey:\n{journey}\n\n",
        "TASK: Return a JSON object with:\n",
        "1. title: A legendary 2-3 word archetype name (e.g., 'The Relentless Seeker', 'The Weaver of Dreams').\n",
        "2. description: A profound summary (3-4 sentences) that frames their choices as evidence of their core spirit. Speak directly to them.\n",
        "3. traits: array of 5-6 symbolic attributes forged during the journey."
      )
      .into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO
/// error, returns None and the defaults apply.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "mind_mirror", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "mind_mirror", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "mind_mirror", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
