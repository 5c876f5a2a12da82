//! Study queue assembly.
//!
//! Cards are partitioned into three buckets:
//! - New: never reviewed, ordered by authoring position
//! - Overdue: reviewed and due, most likely forgotten first
//! - NotDue: reviewed and not yet due, soonest first
//!
//! The queue is bounded by `max_review_cards`. New cards are additionally
//! bounded by `max_new_cards`. Not-due cards only fill leftover room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::progress::{calculate_card_progress, calculate_forgetting_index, days_between, is_card_due_for_review};
use crate::config;
use crate::domain::{Card, CardId, CardLearningState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCategory {
  New,
  Overdue,
  NotDue,
}

impl QueueCategory {
  pub fn classify(state: &CardLearningState, now: DateTime<Utc>) -> Self {
    if state.is_new() {
      Self::New
    } else if is_card_due_for_review(state, now) {
      Self::Overdue
    } else {
      Self::NotDue
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::New => "new",
      Self::Overdue => "overdue",
      Self::NotDue => "not_due",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
  pub max_new_cards: usize,
  pub max_review_cards: usize,
  pub prioritize_overdue: bool,
}

impl Default for QueueOptions {
  fn default() -> Self {
    Self {
      max_new_cards: config::DEFAULT_MAX_NEW_CARDS,
      max_review_cards: config::DEFAULT_MAX_REVIEW_CARDS,
      prioritize_overdue: true,
    }
  }
}

/// A card with its state and the estimates computed for this session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyQueueEntry {
  pub card: Card,
  pub state: CardLearningState,
  pub category: QueueCategory,
  pub progress: f64,
  pub forgetting_index: f64,
  pub is_overdue: bool,
  /// Negative when overdue
  pub due_in_days: f64,
}

impl StudyQueueEntry {
  pub fn new(card: Card, state: CardLearningState, now: DateTime<Utc>) -> Self {
    let category = QueueCategory::classify(&state, now);
    Self {
      progress: calculate_card_progress(&state),
      forgetting_index: calculate_forgetting_index(&state, now),
      is_overdue: category == QueueCategory::Overdue,
      due_in_days: days_between(now, state.due_date),
      category,
      card,
      state,
    }
  }
}

/// Build an ordered practice queue. Cards without a state in `states` are
/// treated as never studied.
pub fn build_study_queue(
  cards: &[Card],
  states: &HashMap<CardId, CardLearningState>,
  options: &QueueOptions,
  now: DateTime<Utc>,
) -> Vec<StudyQueueEntry> {
  let mut new = Vec::new();
  let mut overdue = Vec::new();
  let mut not_due = Vec::new();

  for card in cards {
    let state = states
      .get(&card.id)
      .cloned()
      .unwrap_or_else(|| CardLearningState::new(now));
    let entry = StudyQueueEntry::new(card.clone(), state, now);
    match entry.category {
      QueueCategory::New => new.push(entry),
      QueueCategory::Overdue => overdue.push(entry),
      QueueCategory::NotDue => not_due.push(entry),
    }
  }

  // Stable sorts: ties keep input order
  new.sort_by_key(|e| e.card.position);
  overdue.sort_by(|a, b| {
    b.forgetting_index
      .total_cmp(&a.forgetting_index)
      .then(a.card.position.cmp(&b.card.position))
  });
  not_due.sort_by(|a, b| {
    a.state
      .due_date
      .cmp(&b.state.due_date)
      .then(a.card.position.cmp(&b.card.position))
  });

  tracing::debug!(
    new = new.len(),
    overdue = overdue.len(),
    not_due = not_due.len(),
    "Partitioned study cards"
  );

  let capacity = options.max_review_cards;
  let mut queue = Vec::with_capacity(capacity.min(cards.len()));
  let mut overdue = overdue.into_iter();
  let mut new = new.into_iter();

  if options.prioritize_overdue {
    queue.extend(overdue.by_ref().take(capacity));
    let room = capacity - queue.len();
    queue.extend(new.by_ref().take(options.max_new_cards.min(room)));
  } else {
    let new_available = options.max_new_cards.min(new.len());
    let new_share = if overdue.len() > 0 {
      capacity.div_ceil(2)
    } else {
      capacity
    };
    let overdue_quota = overdue
      .len()
      .min(capacity - new_available.min(new_share));
    // New cards may grow into room the overdue bucket did not need
    let new_quota = new_available.min(capacity - overdue_quota);

    let mut overdue_taken = overdue.by_ref().take(overdue_quota);
    let mut new_taken = new.by_ref().take(new_quota);
    loop {
      match (overdue_taken.next(), new_taken.next()) {
        (None, None) => break,
        (o, n) => {
          queue.extend(o);
          queue.extend(n);
        }
      }
    }

    let room = capacity - queue.len();
    queue.extend(overdue.take(room));
  }

  let room = capacity - queue.len();
  queue.extend(not_due.into_iter().take(room));
  queue
}
