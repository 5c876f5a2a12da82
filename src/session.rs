//! Study sessions: load states, build the queue, grade and persist.
//!
//! Grading for one learner is serialized through a per-learner lock, so two
//! concurrent gradings never race on the same `(user_id, card_id)` state.
//! Every graded state is saved before `grade` returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock, Mutex};

use crate::config;
use crate::db::{LogOnError, StateStore};
use crate::domain::{Card, CardId, CardLearningState, ReviewOutcome};
use crate::error::{StoreError, StoreResult};
use crate::srs::{self, QueueOptions, StudyQueueEntry};

// ==================== Learner Locks ====================

static LEARNER_LOCKS: LazyLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> =
  LazyLock::new(|| Mutex::new(HashMap::new()));

/// Run `f` while holding the learner's lock. The lock entry is dropped again
/// once no other caller holds or waits on it.
fn with_learner_lock<T>(user_id: &str, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
  let lock = {
    let mut locks = LEARNER_LOCKS.lock().map_err(|_| StoreError::Lock)?;
    Arc::clone(locks.entry(user_id.to_string()).or_default())
  };

  let result = match lock.lock() {
    Ok(_guard) => f(),
    Err(_) => Err(StoreError::Lock),
  };
  drop(lock);
  release_learner_lock(user_id);
  result
}

fn release_learner_lock(user_id: &str) {
  let Ok(mut locks) = LEARNER_LOCKS.lock() else {
    return;
  };
  // Clones are only taken under the map lock, so a count of 1 means unused
  if locks.get(user_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
    locks.remove(user_id);
  }
}

/// Grade one card for one learner and persist the result immediately.
///
/// Cards the learner has never seen start from the zero state.
pub fn grade_card<S: StateStore>(
  store: &S,
  user_id: &str,
  card_id: CardId,
  outcome: ReviewOutcome,
  time_spent_ms: Option<u64>,
  now: DateTime<Utc>,
) -> StoreResult<CardLearningState> {
  with_learner_lock(user_id, || grade_unlocked(store, user_id, card_id, outcome, time_spent_ms, now))
}

fn grade_unlocked<S: StateStore>(
  store: &S,
  user_id: &str,
  card_id: CardId,
  outcome: ReviewOutcome,
  time_spent_ms: Option<u64>,
  now: DateTime<Utc>,
) -> StoreResult<CardLearningState> {
  let current = store
    .load_state(user_id, card_id)?
    .unwrap_or_else(|| srs::initialize_learning_state(now));
  let peer_average = if time_spent_ms.is_some() {
    store
      .peer_average_time_ms(user_id, card_id)
      .log_warn("Peer average unavailable")
      .flatten()
  } else {
    None
  };

  let next = srs::schedule_next_review(&current, outcome, now, time_spent_ms, peer_average);
  store.save_states(user_id, &[(card_id, next.clone())])?;

  tracing::debug!(
    user_id,
    card_id,
    outcome = outcome.as_str(),
    interval_days = next.interval_days,
    "Graded card"
  );
  Ok(next)
}

/// Explicit "reset progress" for a set of cards
pub fn reset_progress<S: StateStore>(store: &S, user_id: &str, card_ids: &[CardId]) -> StoreResult<()> {
  with_learner_lock(user_id, || store.reset_states(user_id, card_ids))
}

// ==================== Session Stats ====================

/// Outcome tally for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
  pub forgot: usize,
  pub hard: usize,
  pub good: usize,
  pub skipped: usize,
}

impl SessionStats {
  pub fn record(&mut self, outcome: ReviewOutcome) {
    match outcome {
      ReviewOutcome::Forgot => self.forgot += 1,
      ReviewOutcome::Hard => self.hard += 1,
      ReviewOutcome::Good => self.good += 1,
      ReviewOutcome::Skip => self.skipped += 1,
    }
  }

  pub fn graded(&self) -> usize {
    self.forgot + self.hard + self.good
  }

  /// Recalled share of graded answers, 0 when nothing was graded
  pub fn accuracy(&self) -> f64 {
    let graded = self.graded();
    if graded > 0 {
      (self.hard + self.good) as f64 / graded as f64
    } else {
      0.0
    }
  }
}

// ==================== Study Session ====================

/// One learner working through a queue built at session start.
/// Failed cards are shown again after a few other cards.
#[derive(Debug, Clone)]
pub struct StudySession {
  pub id: String,
  pub user_id: String,
  pub started_at: DateTime<Utc>,
  cards: HashMap<CardId, Card>,
  queue: VecDeque<CardId>,
  /// Recently failed cards, shown again after `REINFORCEMENT_GAP` others
  reinforcement_queue: VecDeque<CardId>,
  cards_since_reinforce: u32,
  current: Option<CardId>,
  stats: SessionStats,
}

impl StudySession {
  /// Load states for `cards`, build the queue and start a session
  pub fn start<S: StateStore>(
    store: &S,
    user_id: &str,
    cards: Vec<Card>,
    options: &QueueOptions,
    now: DateTime<Utc>,
  ) -> StoreResult<Self> {
    let card_ids: Vec<CardId> = cards.iter().map(|c| c.id).collect();
    let states = store.load_states(user_id, &card_ids)?;
    let entries = srs::build_study_queue(&cards, &states, options, now);

    let session = Self::from_queue(user_id, &entries, cards, now);
    tracing::info!(
      user_id,
      session_id = %session.id,
      queued = entries.len(),
      available = session.cards.len(),
      "Started study session"
    );
    Ok(session)
  }

  pub fn from_queue(user_id: &str, entries: &[StudyQueueEntry], cards: Vec<Card>, now: DateTime<Utc>) -> Self {
    Self {
      id: generate_session_id(),
      user_id: user_id.to_string(),
      started_at: now,
      cards: cards.into_iter().map(|c| (c.id, c)).collect(),
      queue: entries.iter().map(|e| e.card.id).collect(),
      reinforcement_queue: VecDeque::new(),
      cards_since_reinforce: 0,
      current: None,
      stats: SessionStats::default(),
    }
  }

  /// Advance to the next card, or `None` when the session is finished
  pub fn next_card(&mut self) -> Option<&Card> {
    let next = if self.should_show_reinforcement() || self.queue.is_empty() {
      self.cards_since_reinforce = 0;
      self.reinforcement_queue.pop_front().or_else(|| self.queue.pop_front())
    } else {
      self.cards_since_reinforce += 1;
      self.queue.pop_front()
    };

    self.current = next;
    next.and_then(|id| self.cards.get(&id))
  }

  pub fn current_card(&self) -> Option<&Card> {
    self.current.and_then(|id| self.cards.get(&id))
  }

  /// Grade the current card and persist the new state
  pub fn grade<S: StateStore>(
    &mut self,
    store: &S,
    outcome: ReviewOutcome,
    time_spent_ms: Option<u64>,
    now: DateTime<Utc>,
  ) -> StoreResult<Option<CardLearningState>> {
    let Some(card_id) = self.current.take() else {
      return Ok(None);
    };

    let state = grade_card(store, &self.user_id, card_id, outcome, time_spent_ms, now)?;
    self.stats.record(outcome);

    match outcome {
      ReviewOutcome::Forgot => self.add_failed_card(card_id),
      ReviewOutcome::Hard | ReviewOutcome::Good => self.remove_from_reinforcement(card_id),
      ReviewOutcome::Skip => self.queue.push_back(card_id),
    }
    Ok(Some(state))
  }

  pub fn stats(&self) -> SessionStats {
    self.stats
  }

  pub fn remaining(&self) -> usize {
    self.queue.len() + self.reinforcement_queue.len()
  }

  pub fn is_finished(&self) -> bool {
    self.current.is_none() && self.remaining() == 0
  }

  fn add_failed_card(&mut self, card_id: CardId) {
    if !self.reinforcement_queue.contains(&card_id) {
      self.reinforcement_queue.push_back(card_id);
    }
  }

  fn remove_from_reinforcement(&mut self, card_id: CardId) {
    self.reinforcement_queue.retain(|&id| id != card_id);
  }

  fn should_show_reinforcement(&self) -> bool {
    !self.reinforcement_queue.is_empty() && self.cards_since_reinforce >= config::REINFORCEMENT_GAP
  }
}

// ==================== Session IDs ====================

/// Generate a new session ID
pub fn generate_session_id() -> String {
  use rand::Rng;
  let mut rng = rand::rng();
  (0..32)
    .map(|_| {
      let idx = rng.random_range(0..36u8);
      if idx < 10 {
        (b'0' + idx) as char
      } else {
        (b'a' + idx - 10) as char
      }
    })
    .collect()
}
