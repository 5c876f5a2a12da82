//! Lifetime study statistics over a collection of learning states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress::{calculate_card_progress, is_card_due_for_review};
use crate::domain::CardLearningState;

/// Cards with fewer consecutive recalls than this are still learning
pub const LEARNING_REPETITIONS: u32 = 3;
/// Interval at which a card counts as mature
pub const MATURE_INTERVAL_DAYS: f64 = 21.0;
/// Progress a mature card needs to count as mastered
pub const MASTERY_PROGRESS: f64 = 0.9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyStats {
  pub total_cards: usize,
  pub new_cards: usize,
  pub learning_cards: usize,
  pub mastered_cards: usize,
  pub mature_cards: usize,
  pub overdue_cards: usize,
  pub average_ease: f64,
  pub average_interval: f64,
  /// Recalled share of all graded reviews, skips excluded
  pub retention: f64,
}

pub fn generate_study_stats<'a, I>(states: I, now: DateTime<Utc>) -> StudyStats
where
  I: IntoIterator<Item = &'a CardLearningState>,
{
  let mut stats = StudyStats::default();
  let mut ease_sum = 0.0;
  let mut interval_sum = 0.0;
  let mut graded = 0usize;
  let mut recalled = 0usize;

  for state in states {
    stats.total_cards += 1;
    ease_sum += state.ease_factor;
    interval_sum += state.interval_days;

    for event in &state.history {
      if event.outcome.is_graded() {
        graded += 1;
        if event.outcome.is_recalled() {
          recalled += 1;
        }
      }
    }

    if state.is_new() {
      stats.new_cards += 1;
      continue;
    }
    if state.repetitions < LEARNING_REPETITIONS {
      stats.learning_cards += 1;
    }
    if state.interval_days >= MATURE_INTERVAL_DAYS {
      stats.mature_cards += 1;
      if calculate_card_progress(state) > MASTERY_PROGRESS {
        stats.mastered_cards += 1;
      }
    }
    if is_card_due_for_review(state, now) {
      stats.overdue_cards += 1;
    }
  }

  if stats.total_cards > 0 {
    stats.average_ease = ease_sum / stats.total_cards as f64;
    stats.average_interval = interval_sum / stats.total_cards as f64;
  }
  if graded > 0 {
    stats.retention = recalled as f64 / graded as f64;
  }
  stats
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ReviewOutcome;
  use crate::srs::sm2::{initialize_learning_state, schedule_next_review, DEFAULT_EASE_FACTOR};
  use chrono::{Duration, TimeZone};

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
  }

  fn graded(outcomes: &[ReviewOutcome]) -> CardLearningState {
    let mut state = initialize_learning_state(t0());
    for outcome in outcomes {
      state = schedule_next_review(&state, *outcome, t0(), None, None);
    }
    state
  }

  #[test]
  fn test_empty_is_all_zero() {
    let empty: Vec<CardLearningState> = Vec::new();
    let stats = generate_study_stats(&empty, t0());
    assert_eq!(stats, StudyStats::default());
    assert_eq!(stats.retention, 0.0);
    assert_eq!(stats.average_ease, 0.0);
  }

  #[test]
  fn test_counts_new_and_learning() {
    let states = vec![
      initialize_learning_state(t0()),
      initialize_learning_state(t0()),
      graded(&[ReviewOutcome::Good]),
      graded(&[ReviewOutcome::Good, ReviewOutcome::Forgot]),
    ];
    let stats = generate_study_stats(&states, t0() + Duration::minutes(1));

    assert_eq!(stats.total_cards, 4);
    assert_eq!(stats.new_cards, 2);
    assert_eq!(stats.learning_cards, 2);
    assert_eq!(stats.mature_cards, 0);
    assert_eq!(stats.mastered_cards, 0);
    // Lapsed card falls due at +10m, the other at +1d
    assert_eq!(stats.overdue_cards, 0);
  }

  #[test]
  fn test_overdue_excludes_new_cards() {
    let states = vec![initialize_learning_state(t0()), graded(&[ReviewOutcome::Good])];
    let stats = generate_study_stats(&states, t0() + Duration::days(5));
    assert_eq!(stats.overdue_cards, 1);
  }

  #[test]
  fn test_mature_and_mastered() {
    let mut mastered = graded(&[ReviewOutcome::Good; 12]);
    assert!(mastered.interval_days >= MATURE_INTERVAL_DAYS);
    mastered.ease_factor = 3.0;

    let mut mature_only = graded(&[ReviewOutcome::Good]);
    mature_only.repetitions = 2;
    mature_only.interval_days = 30.0;

    let stats = generate_study_stats(&[mastered, mature_only], t0());
    assert_eq!(stats.mature_cards, 2);
    assert_eq!(stats.mastered_cards, 1);
    assert_eq!(stats.learning_cards, 1);
  }

  #[test]
  fn test_hard_only_card_can_be_mastered() {
    let mut state = initialize_learning_state(t0());
    for _ in 0..80 {
      let at = state.due_date;
      state = schedule_next_review(&state, ReviewOutcome::Hard, at, None, None);
    }
    let stats = generate_study_stats(&[state], t0());
    assert_eq!(stats.mature_cards, 1);
    assert_eq!(stats.mastered_cards, 1);
  }

  #[test]
  fn test_retention_counts_graded_events() {
    let states = vec![
      graded(&[ReviewOutcome::Good, ReviewOutcome::Hard, ReviewOutcome::Forgot]),
      graded(&[ReviewOutcome::Skip, ReviewOutcome::Good]),
    ];
    let stats = generate_study_stats(&states, t0());
    // 3 recalled of 4 graded; the skip is neutral
    assert!((stats.retention - 0.75).abs() < 1e-12);
  }

  #[test]
  fn test_averages() {
    let mut a = initialize_learning_state(t0());
    a.interval_days = 2.0;
    let mut b = initialize_learning_state(t0());
    b.interval_days = 6.0;
    b.ease_factor = 1.5;

    let stats = generate_study_stats(&[a, b], t0());
    assert!((stats.average_interval - 4.0).abs() < 1e-12);
    assert!((stats.average_ease - (DEFAULT_EASE_FACTOR + 1.5) / 2.0).abs() < 1e-12);
  }

  #[test]
  fn test_accepts_map_values() {
    let mut map = std::collections::HashMap::new();
    map.insert(1i64, graded(&[ReviewOutcome::Good]));
    map.insert(2i64, initialize_learning_state(t0()));
    let stats = generate_study_stats(map.values(), t0());
    assert_eq!(stats.total_cards, 2);
    assert_eq!(stats.new_cards, 1);
  }
}
