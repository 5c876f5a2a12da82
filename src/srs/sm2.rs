//! SM-2 family review processing.
//!
//! Maps a learning state and a graded outcome to the next learning state.
//! All functions are pure: the current time is passed in, nothing is read
//! from the clock.
//!
//! Outcomes:
//! - `Forgot`: repetitions reset, short relearning interval, ease penalty
//! - `Hard`: interval grows by a reduced multiplier, small ease penalty
//! - `Good`: interval grows by the ease factor, small ease bonus
//! - `Skip`: history entry only

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CardLearningState, ReviewEvent, ReviewOutcome};

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_EASE_FACTOR: f64 = 3.0;

/// Relearning interval after a lapse: 10 minutes
pub const RELEARN_INTERVAL_DAYS: f64 = 10.0 / 1440.0;
/// Interval after the first successful recall
pub const MIN_FIRST_INTERVAL_DAYS: f64 = 1.0;
/// Upper bound on any interval (100 years)
pub const MAX_INTERVAL_DAYS: f64 = 36_500.0;

const FORGOT_EASE_PENALTY: f64 = 0.2;
const HARD_EASE_PENALTY: f64 = 0.15;
const HARD_INTERVAL_MULTIPLIER: f64 = 1.2;
const GOOD_EASE_BONUS: f64 = 0.05;

// Response-time confidence: answers slower than 1.5x the peer average lose
// a quarter of the Good bonus per extra multiple, down to half.
const SLOW_RESPONSE_RATIO: f64 = 1.5;
const CONFIDENCE_DISCOUNT_PER_RATIO: f64 = 0.25;
const MIN_CONFIDENCE_FACTOR: f64 = 0.5;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Zero state for a card seen for the first time
pub fn initialize_learning_state(now: DateTime<Utc>) -> CardLearningState {
  CardLearningState::new(now)
}

/// Explicit "reset progress" action. Clears history as well.
pub fn reset_progress(now: DateTime<Utc>) -> CardLearningState {
  CardLearningState::new(now)
}

/// Confidence factor in `[MIN_CONFIDENCE_FACTOR, 1.0]` derived from how long
/// the learner took compared to other learners on the same card.
pub fn confidence_factor(time_spent_ms: Option<u64>, peer_average_time_spent_ms: Option<u64>) -> f64 {
  match (time_spent_ms, peer_average_time_spent_ms) {
    (Some(spent), Some(peer)) if peer > 0 => {
      let ratio = spent as f64 / peer as f64;
      if ratio <= SLOW_RESPONSE_RATIO {
        1.0
      } else {
        (1.0 - (ratio - SLOW_RESPONSE_RATIO) * CONFIDENCE_DISCOUNT_PER_RATIO).max(MIN_CONFIDENCE_FACTOR)
      }
    }
    _ => 1.0,
  }
}

/// Process one graded review and return the new state.
///
/// The returned state has one more history entry than `state`. The entry is
/// stamped `max(now, last entry)` so history stays ordered under clock skew.
pub fn schedule_next_review(
  state: &CardLearningState,
  outcome: ReviewOutcome,
  now: DateTime<Utc>,
  time_spent_ms: Option<u64>,
  peer_average_time_spent_ms: Option<u64>,
) -> CardLearningState {
  let event_time = state
    .last_review()
    .map_or(now, |last| now.max(last.timestamp));

  let mut next = state.clone();
  next
    .history
    .push(ReviewEvent::new(event_time, outcome, time_spent_ms));

  match outcome {
    ReviewOutcome::Skip => {
      next.due_date = next.due_date.max(event_time);
      return next;
    }
    ReviewOutcome::Forgot => {
      next.repetitions = 0;
      next.interval_days = RELEARN_INTERVAL_DAYS;
      next.ease_factor = clamp_ease(state.ease_factor - FORGOT_EASE_PENALTY);
    }
    ReviewOutcome::Hard => {
      next.repetitions = state.repetitions.saturating_add(1);
      next.interval_days = grow_interval(state.interval_days, HARD_INTERVAL_MULTIPLIER);
      next.ease_factor = clamp_ease(state.ease_factor - HARD_EASE_PENALTY);
    }
    ReviewOutcome::Good => {
      let confidence = confidence_factor(time_spent_ms, peer_average_time_spent_ms);
      let growth = 1.0 + (state.ease_factor - 1.0) * confidence;
      next.repetitions = state.repetitions.saturating_add(1);
      next.interval_days = grow_interval(state.interval_days, growth);
      next.ease_factor = clamp_ease(state.ease_factor + GOOD_EASE_BONUS * confidence);
    }
  }

  next.due_date = event_time + days_to_duration(next.interval_days);
  next
}

/// Interval each graded outcome would produce, for labelling answer buttons
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomePreview {
  pub forgot: f64,
  pub hard: f64,
  pub good: f64,
}

pub fn preview_intervals(state: &CardLearningState, now: DateTime<Utc>) -> OutcomePreview {
  let interval = |outcome| schedule_next_review(state, outcome, now, None, None).interval_days;
  OutcomePreview {
    forgot: interval(ReviewOutcome::Forgot),
    hard: interval(ReviewOutcome::Hard),
    good: interval(ReviewOutcome::Good),
  }
}

/// Compact human-readable interval: `10m`, `3h`, `1d`, `2w`, `4mo`, `1y`
pub fn format_interval(days: f64) -> String {
  if days <= 0.0 {
    "now".to_string()
  } else if days < 1.0 / 24.0 {
    format!("{}m", (days * 1440.0).round().max(1.0) as i64)
  } else if days < 1.0 {
    format!("{}h", (days * 24.0).round() as i64)
  } else if days < 7.0 {
    format!("{}d", days.round() as i64)
  } else if days < 30.0 {
    format!("{}w", (days / 7.0).floor() as i64)
  } else if days < 365.0 {
    format!("{}mo", (days / 30.0).floor() as i64)
  } else {
    format!("{}y", (days / 365.0).floor() as i64)
  }
}

pub(crate) fn days_to_duration(days: f64) -> Duration {
  Duration::milliseconds((days * MS_PER_DAY).round() as i64)
}

fn clamp_ease(ease: f64) -> f64 {
  ease.clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR)
}

/// Never shrinks: the result is at least `current`, at least the first
/// interval, and at most `MAX_INTERVAL_DAYS` unless `current` already is.
fn grow_interval(current: f64, multiplier: f64) -> f64 {
  let grown = (current * multiplier)
    .max(MIN_FIRST_INTERVAL_DAYS)
    .min(MAX_INTERVAL_DAYS);
  grown.max(current)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
  }

  fn review(state: &CardLearningState, outcome: ReviewOutcome) -> CardLearningState {
    schedule_next_review(state, outcome, t0(), None, None)
  }

  #[test]
  fn test_first_review_good() {
    let state = initialize_learning_state(t0());
    let result = review(&state, ReviewOutcome::Good);
    assert_eq!(result.repetitions, 1);
    assert!((result.interval_days - MIN_FIRST_INTERVAL_DAYS).abs() < f64::EPSILON);
    assert_eq!(result.due_date, t0() + Duration::days(1));
    assert_eq!(result.history.len(), 1);
  }

  #[test]
  fn test_first_review_is_deterministic_per_outcome() {
    let state = initialize_learning_state(t0());
    let forgot = review(&state, ReviewOutcome::Forgot);
    let hard = review(&state, ReviewOutcome::Hard);
    let good = review(&state, ReviewOutcome::Good);

    assert!((forgot.interval_days - RELEARN_INTERVAL_DAYS).abs() < f64::EPSILON);
    assert!((hard.interval_days - MIN_FIRST_INTERVAL_DAYS).abs() < f64::EPSILON);
    assert!((good.interval_days - MIN_FIRST_INTERVAL_DAYS).abs() < f64::EPSILON);

    // Same inputs, same outputs
    assert_eq!(review(&state, ReviewOutcome::Hard), hard);
  }

  #[test]
  fn test_good_sequence_grows_interval_and_due_date() {
    let mut state = initialize_learning_state(t0());
    let mut now = t0();
    let mut last_interval = state.interval_days;
    let mut last_due = state.due_date;

    for _ in 0..3 {
      state = schedule_next_review(&state, ReviewOutcome::Good, now, None, None);
      assert!(state.interval_days > last_interval);
      assert!(state.due_date > last_due);
      last_interval = state.interval_days;
      last_due = state.due_date;
      now = state.due_date;
    }

    assert_eq!(state.repetitions, 3);
    // 1.0 -> 2.55 -> 2.55 * 2.6
    assert!((state.interval_days - 2.55 * 2.6).abs() < 1e-9);
  }

  #[test]
  fn test_forgot_after_good_sequence_resets() {
    let mut state = initialize_learning_state(t0());
    for _ in 0..3 {
      state = review(&state, ReviewOutcome::Good);
    }
    let ease_before = state.ease_factor;

    let lapsed = review(&state, ReviewOutcome::Forgot);
    assert_eq!(lapsed.repetitions, 0);
    assert!((lapsed.interval_days - RELEARN_INTERVAL_DAYS).abs() < f64::EPSILON);
    assert!(lapsed.interval_days < 1.0);
    assert!((lapsed.ease_factor - (ease_before - 0.2)).abs() < 1e-9);
    assert_eq!(lapsed.due_date, t0() + Duration::minutes(10));
  }

  #[test]
  fn test_ease_factor_floor() {
    let mut state = initialize_learning_state(t0());
    state.repetitions = 5;
    state.interval_days = 10.0;

    for _ in 0..20 {
      state = review(&state, ReviewOutcome::Forgot);
      assert!(state.ease_factor >= MIN_EASE_FACTOR);
    }
    assert!((state.ease_factor - MIN_EASE_FACTOR).abs() < f64::EPSILON);

    for _ in 0..20 {
      state = review(&state, ReviewOutcome::Hard);
      assert!(state.ease_factor >= MIN_EASE_FACTOR);
    }
  }

  #[test]
  fn test_ease_factor_ceiling() {
    let mut state = initialize_learning_state(t0());
    for _ in 0..40 {
      state = review(&state, ReviewOutcome::Good);
      assert!(state.ease_factor <= MAX_EASE_FACTOR);
    }
    assert!((state.ease_factor - MAX_EASE_FACTOR).abs() < f64::EPSILON);
  }

  #[test]
  fn test_interval_capped() {
    let mut state = initialize_learning_state(t0());
    for _ in 0..60 {
      state = review(&state, ReviewOutcome::Good);
    }
    assert!(state.interval_days <= MAX_INTERVAL_DAYS);
    assert!((state.interval_days - MAX_INTERVAL_DAYS).abs() < f64::EPSILON);
  }

  #[test]
  fn test_good_never_decreases_interval() {
    let intervals = [0.0, RELEARN_INTERVAL_DAYS, 0.5, 1.0, 6.0, 40.0, 1000.0, MAX_INTERVAL_DAYS];
    let eases = [MIN_EASE_FACTOR, 2.0, DEFAULT_EASE_FACTOR, MAX_EASE_FACTOR];
    for &interval in &intervals {
      for &ease in &eases {
        let mut state = initialize_learning_state(t0());
        state.interval_days = interval;
        state.ease_factor = ease;
        // Very slow answer gets the strongest discount
        let result = schedule_next_review(&state, ReviewOutcome::Good, t0(), Some(60_000), Some(1_000));
        assert!(result.interval_days >= interval, "interval {interval} ease {ease}");
      }
    }
  }

  #[test]
  fn test_hard_grows_less_than_good() {
    let mut state = initialize_learning_state(t0());
    state.repetitions = 3;
    state.interval_days = 10.0;

    let hard = review(&state, ReviewOutcome::Hard);
    let good = review(&state, ReviewOutcome::Good);
    assert_eq!(hard.repetitions, 4);
    assert!((hard.interval_days - 12.0).abs() < 1e-9);
    assert!(hard.interval_days < good.interval_days);
    assert!(hard.ease_factor < state.ease_factor);
  }

  #[test]
  fn test_skip_only_appends_history() {
    let mut state = initialize_learning_state(t0() - Duration::days(3));
    state = schedule_next_review(&state, ReviewOutcome::Good, t0() - Duration::days(3), None, None);
    state = schedule_next_review(&state, ReviewOutcome::Good, t0() - Duration::days(2), None, None);

    let skipped = review(&state, ReviewOutcome::Skip);
    assert_eq!(skipped.repetitions, state.repetitions);
    assert_eq!(skipped.interval_days, state.interval_days);
    assert_eq!(skipped.ease_factor, state.ease_factor);
    assert_eq!(skipped.history.len(), state.history.len() + 1);
    assert_eq!(skipped.history.last().unwrap().outcome, ReviewOutcome::Skip);
    assert!(skipped.due_date >= skipped.history.last().unwrap().timestamp);
  }

  #[test]
  fn test_skip_keeps_future_due_date() {
    let state = review(&initialize_learning_state(t0()), ReviewOutcome::Good);
    let skipped = review(&state, ReviewOutcome::Skip);
    assert_eq!(skipped.due_date, state.due_date);
  }

  #[test]
  fn test_history_is_append_only() {
    let mut state = initialize_learning_state(t0());
    let outcomes = [
      ReviewOutcome::Good,
      ReviewOutcome::Hard,
      ReviewOutcome::Forgot,
      ReviewOutcome::Skip,
      ReviewOutcome::Good,
    ];
    for (i, outcome) in outcomes.iter().enumerate() {
      let previous = state.history.clone();
      state = schedule_next_review(&state, *outcome, t0() + Duration::hours(i as i64), Some(900), None);
      assert_eq!(&state.history[..previous.len()], previous.as_slice());
      assert_eq!(state.history.last().unwrap().outcome, *outcome);
      assert!(state.validate(1).is_ok());
    }
  }

  #[test]
  fn test_clock_skew_keeps_history_ordered() {
    let state = review(&initialize_learning_state(t0()), ReviewOutcome::Good);
    let earlier = t0() - Duration::hours(2);
    let result = schedule_next_review(&state, ReviewOutcome::Good, earlier, None, None);
    assert_eq!(result.history[1].timestamp, t0());
    assert!(result.validate(1).is_ok());
  }

  #[test]
  fn test_confidence_factor() {
    assert_eq!(confidence_factor(None, None), 1.0);
    assert_eq!(confidence_factor(Some(5_000), None), 1.0);
    assert_eq!(confidence_factor(Some(5_000), Some(0)), 1.0);
    assert_eq!(confidence_factor(Some(1_500), Some(1_000)), 1.0);
    // ratio 2.5 -> 1 - 1.0 * 0.25
    assert!((confidence_factor(Some(2_500), Some(1_000)) - 0.75).abs() < 1e-9);
    assert_eq!(confidence_factor(Some(100_000), Some(1_000)), MIN_CONFIDENCE_FACTOR);
  }

  #[test]
  fn test_slow_good_gets_reduced_bonus() {
    let mut state = initialize_learning_state(t0());
    state.repetitions = 2;
    state.interval_days = 4.0;

    let quick = schedule_next_review(&state, ReviewOutcome::Good, t0(), Some(1_000), Some(1_000));
    let slow = schedule_next_review(&state, ReviewOutcome::Good, t0(), Some(10_000), Some(1_000));

    // Still a successful recall
    assert_eq!(slow.repetitions, quick.repetitions);
    assert!(slow.interval_days < quick.interval_days);
    assert!(slow.interval_days > state.interval_days);
    assert!(slow.ease_factor < quick.ease_factor);
    assert!(slow.ease_factor >= state.ease_factor);
  }

  #[test]
  fn test_reset_progress() {
    let mut state = initialize_learning_state(t0());
    for _ in 0..4 {
      state = review(&state, ReviewOutcome::Good);
    }
    let reset = reset_progress(t0());
    assert_ne!(reset, state);
    assert_eq!(reset, initialize_learning_state(t0()));
  }

  #[test]
  fn test_preview_intervals() {
    let mut state = initialize_learning_state(t0());
    state.repetitions = 3;
    state.interval_days = 10.0;

    let preview = preview_intervals(&state, t0());
    assert!((preview.forgot - RELEARN_INTERVAL_DAYS).abs() < f64::EPSILON);
    assert!((preview.hard - 12.0).abs() < 1e-9);
    assert!((preview.good - 25.0).abs() < 1e-9);
  }

  #[test]
  fn test_format_interval() {
    assert_eq!(format_interval(0.0), "now");
    assert_eq!(format_interval(RELEARN_INTERVAL_DAYS), "10m");
    assert_eq!(format_interval(0.25), "6h");
    assert_eq!(format_interval(1.0), "1d");
    assert_eq!(format_interval(2.55), "3d");
    assert_eq!(format_interval(14.0), "2w");
    assert_eq!(format_interval(95.0), "3mo");
    assert_eq!(format_interval(800.0), "2y");
  }
}
