//! Mastery and forgetting estimates derived from a learning state.

use chrono::{DateTime, Utc};

use super::sm2::{MAX_EASE_FACTOR, MIN_EASE_FACTOR, RELEARN_INTERVAL_DAYS};
use crate::domain::CardLearningState;

/// Repetitions needed to reach ~63% progress at the ease floor
const PROGRESS_SCALE_AT_MIN_EASE: f64 = 4.0;
/// Repetitions needed to reach ~63% progress at the ease ceiling
const PROGRESS_SCALE_AT_MAX_EASE: f64 = 2.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Mastery score in `[0, 1]`. Zero for new cards, saturating towards 1 as
/// repetitions grow. Ease only sets how fast it saturates, so every card
/// approaches 1 given enough successful repetitions.
pub fn calculate_card_progress(state: &CardLearningState) -> f64 {
  if state.repetitions == 0 {
    return 0.0;
  }

  let ease_weight = ((state.ease_factor - MIN_EASE_FACTOR) / (MAX_EASE_FACTOR - MIN_EASE_FACTOR)).clamp(0.0, 1.0);
  let scale = PROGRESS_SCALE_AT_MAX_EASE + (PROGRESS_SCALE_AT_MIN_EASE - PROGRESS_SCALE_AT_MAX_EASE) * (1.0 - ease_weight);

  (1.0 - (-(state.repetitions as f64) / scale).exp()).clamp(0.0, 1.0)
}

/// Overdue time measured in units of the card's own interval.
///
/// Positive when past due, zero exactly at the due date, negative before.
/// A card with a long proven interval grows this more slowly per overdue day
/// than a fragile one.
pub fn calculate_forgetting_index(state: &CardLearningState, now: DateTime<Utc>) -> f64 {
  let stability = state.interval_days.max(RELEARN_INTERVAL_DAYS);
  days_between(state.due_date, now) / stability
}

/// Due is inclusive: a card is due at exactly its due date
pub fn is_card_due_for_review(state: &CardLearningState, now: DateTime<Utc>) -> bool {
  now >= state.due_date
}

/// Fractional days from `from` to `to` (negative when `to` is earlier)
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
  let delta = to - from;
  match delta.num_microseconds() {
    Some(us) => us as f64 / (SECONDS_PER_DAY * 1_000_000.0),
    None => delta.num_seconds() as f64 / SECONDS_PER_DAY,
  }
}
