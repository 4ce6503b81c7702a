//! The round catalog: five fixed narrative phases, in order.
//!
//! Order is semantic (round sequence); nothing else in the system may reorder
//! or mutate these. Both the state machine (prompt theme) and the wire layer
//! (titles/descriptions for the client) read from here.

use crate::domain::RoundTheme;

pub const NUM_ROUNDS: usize = 5;

pub const ROUND_THEMES: [RoundTheme; NUM_ROUNDS] = [
  RoundTheme {
    id: 1,
    name: "Chapter I: The Awakening",
    description:
      "You find yourself in a place between worlds. How did you arrive, and what do you first seek?",
  },
  RoundTheme {
    id: 2,
    name: "Chapter II: The Threshold",
    description:
      "The path ahead splits. Guardians watch from the shadows. Will you negotiate, hide, or push through?",
  },
  RoundTheme {
    id: 3,
    name: "Chapter III: The Encounter",
    description:
      "You meet an entity of pure light and silence. It offers you a gift that comes with a price.",
  },
  RoundTheme {
    id: 4,
    name: "Chapter IV: The Trial",
    description:
      "The environment turns hostile, mirroring your internal conflicts. The way out is through the heart of the storm.",
  },
  RoundTheme {
    id: 5,
    name: "Chapter V: The Mirror's Edge",
    description:
      "You reach the source. The reflection you see is not your face, but your nature. The final choice remains.",
  },
];

/// Theme for a 0-based round index, if in range.
pub fn theme(round_index: usize) -> Option<&'static RoundTheme> {
  ROUND_THEMES.get(round_index)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn catalog_is_five_rounds_in_order() {
    assert_eq!(ROUND_THEMES.len(), 5);
    for (i, t) in ROUND_THEMES.iter().enumerate() {
      assert_eq!(t.id as usize, i + 1);
      assert!(!t.name.is_empty());
      assert!(!t.description.is_empty());
    }
  }

  #[test]
  fn theme_lookup_bounds() {
    assert_eq!(theme(0).unwrap().id, 1);
    assert_eq!(theme(4).unwrap().id, 5);
    assert!(theme(5).is_none());
  }
}
