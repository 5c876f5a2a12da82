use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::review::{ReviewEvent, ReviewOutcome};
use crate::error::SrsError;
use crate::srs::sm2::{DEFAULT_EASE_FACTOR, MAX_EASE_FACTOR, MAX_INTERVAL_DAYS, MIN_EASE_FACTOR};

pub type CardId = i64;

/// A flashcard as authored in a set. Scheduling data lives in
/// [`CardLearningState`], one per learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
  pub id: CardId,
  pub set_id: String,
  /// Stable authoring order within the set
  pub position: u32,
  pub front: String,
  pub back: String,
}

impl Card {
  pub fn new(set_id: String, position: u32, front: String, back: String) -> Self {
    Self {
      id: 0,
      set_id,
      position,
      front,
      back,
    }
  }
}

/// Per card, per learner scheduling record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardLearningState {
  /// Consecutive successful recalls since the last lapse
  pub repetitions: u32,
  /// Days until the next review, 0 when never scheduled
  pub interval_days: f64,
  pub ease_factor: f64,
  pub due_date: DateTime<Utc>,
  /// Append-only, oldest first
  pub history: Vec<ReviewEvent>,
}

impl CardLearningState {
  /// Zero state for a card the learner has never seen
  pub fn new(now: DateTime<Utc>) -> Self {
    Self {
      repetitions: 0,
      interval_days: 0.0,
      ease_factor: DEFAULT_EASE_FACTOR,
      due_date: now,
      history: Vec::new(),
    }
  }

  pub fn is_new(&self) -> bool {
    self.history.is_empty()
  }

  pub fn last_review(&self) -> Option<&ReviewEvent> {
    self.history.last()
  }

  pub fn count_outcome(&self, outcome: ReviewOutcome) -> usize {
    self.history.iter().filter(|e| e.outcome == outcome).count()
  }

  /// Check a state loaded from storage. The scheduling functions never
  /// produce a state that fails this.
  pub fn validate(&self, card_id: CardId) -> Result<(), SrsError> {
    let invalid = |reason: String| SrsError::InvalidState { card_id, reason };

    if !self.interval_days.is_finite() || self.interval_days < 0.0 {
      return Err(invalid(format!("interval_days {} is negative or not finite", self.interval_days)));
    }
    if self.interval_days > MAX_INTERVAL_DAYS {
      return Err(invalid(format!(
        "interval_days {} exceeds maximum {}",
        self.interval_days, MAX_INTERVAL_DAYS
      )));
    }
    if !self.ease_factor.is_finite()
      || self.ease_factor < MIN_EASE_FACTOR
      || self.ease_factor > MAX_EASE_FACTOR
    {
      return Err(invalid(format!(
        "ease_factor {} outside [{}, {}]",
        self.ease_factor, MIN_EASE_FACTOR, MAX_EASE_FACTOR
      )));
    }
    if self.history.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
      return Err(invalid("history is not in chronological order".to_string()));
    }
    if let Some(last) = self.last_review() {
      if self.due_date < last.timestamp {
        return Err(invalid("due_date precedes the last review".to_string()));
      }
    }
    Ok(())
  }
}
