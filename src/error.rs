//! Error types for the scheduling engine and its storage collaborator.
//!
//! Empty card or state collections are valid inputs for the queue and
//! stats functions; they produce empty results rather than errors.

use thiserror::Error;

use crate::domain::CardId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SrsError {
  #[error("Invalid review outcome: {0:?}")]
  InvalidOutcome(String),

  #[error("Invalid learning state for card {card_id}: {reason}")]
  InvalidState { card_id: CardId, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("Database unavailable")]
  Lock,

  #[error(transparent)]
  Invalid(#[from] SrsError),

  #[error("Stale history for card {card_id}: stored {stored} events, got {given}")]
  StaleHistory {
    card_id: CardId,
    stored: usize,
    given: usize,
  },

  #[error("History for card {card_id} diverges from the stored one at event {seq}")]
  HistoryConflict { card_id: CardId, seq: usize },

  #[error("Corrupt stored value: {0}")]
  Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
