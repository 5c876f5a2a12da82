use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SrsError;

/// Graded result of a single review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
  /// Could not recall the answer
  Forgot,
  /// Recalled with serious difficulty
  Hard,
  /// Recalled correctly
  Good,
  /// Deferred without grading
  Skip,
}

impl ReviewOutcome {
  pub const GRADED: [ReviewOutcome; 3] = [Self::Forgot, Self::Hard, Self::Good];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Forgot => "forgot",
      Self::Hard => "hard",
      Self::Good => "good",
      Self::Skip => "skip",
    }
  }

  /// True for outcomes that count as a successful recall
  pub fn is_recalled(&self) -> bool {
    matches!(self, Self::Hard | Self::Good)
  }

  /// Skip is neutral: it neither strengthens nor weakens the card
  pub fn is_graded(&self) -> bool {
    !matches!(self, Self::Skip)
  }
}

impl FromStr for ReviewOutcome {
  type Err = SrsError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "forgot" => Ok(Self::Forgot),
      "hard" => Ok(Self::Hard),
      "good" => Ok(Self::Good),
      "skip" => Ok(Self::Skip),
      other => Err(SrsError::InvalidOutcome(other.to_string())),
    }
  }
}

impl fmt::Display for ReviewOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One entry in a card's append-only review history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
  pub timestamp: DateTime<Utc>,
  pub outcome: ReviewOutcome,
  pub time_spent_ms: Option<u64>,
}

impl ReviewEvent {
  pub fn new(timestamp: DateTime<Utc>, outcome: ReviewOutcome, time_spent_ms: Option<u64>) -> Self {
    Self {
      timestamp,
      outcome,
      time_spent_ms,
    }
  }
}
