//! Learning-state persistence port and its SQLite implementation.
//!
//! States are keyed explicitly by `(user_id, card_id)`. History is stored as
//! one row per event with a sequence number, so reading it back preserves
//! the exact order it was written in.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use super::{try_lock, DbPool};
use crate::domain::{CardId, CardLearningState, ReviewEvent, ReviewOutcome};
use crate::error::{StoreError, StoreResult};

/// Storage collaborator for learning states
pub trait StateStore {
  /// States for the requested cards. Cards never studied are absent.
  fn load_states(&self, user_id: &str, card_ids: &[CardId]) -> StoreResult<HashMap<CardId, CardLearningState>>;

  /// Persist states. Only history events not yet stored are appended; a
  /// state whose history is shorter than the stored one, or differs from it
  /// in any stored event, is rejected and the whole batch is left unsaved.
  fn save_states(&self, user_id: &str, states: &[(CardId, CardLearningState)]) -> StoreResult<()>;

  /// Explicit reset: drop state and history so the cards are new again
  fn reset_states(&self, user_id: &str, card_ids: &[CardId]) -> StoreResult<()>;

  /// Mean time other learners spent on a card, over timed graded reviews
  fn peer_average_time_ms(&self, user_id: &str, card_id: CardId) -> StoreResult<Option<u64>>;

  fn load_state(&self, user_id: &str, card_id: CardId) -> StoreResult<Option<CardLearningState>> {
    Ok(self.load_states(user_id, &[card_id])?.remove(&card_id))
  }
}

#[derive(Clone)]
pub struct SqliteStateStore {
  pool: DbPool,
}

impl SqliteStateStore {
  pub fn new(pool: DbPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &DbPool {
    &self.pool
  }
}

impl StateStore for SqliteStateStore {
  fn load_states(&self, user_id: &str, card_ids: &[CardId]) -> StoreResult<HashMap<CardId, CardLearningState>> {
    let conn = try_lock(&self.pool)?;
    let mut state_stmt = conn.prepare(
      r#"
      SELECT repetitions, interval_days, ease_factor, due_date
      FROM learning_states
      WHERE user_id = ?1 AND card_id = ?2
      "#,
    )?;

    let mut states = HashMap::with_capacity(card_ids.len());
    for &card_id in card_ids {
      let row = state_stmt
        .query_row(params![user_id, card_id], |row| {
          Ok((
            row.get::<_, u32>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, String>(3)?,
          ))
        })
        .optional()?;
      let Some((repetitions, interval_days, ease_factor, due_date)) = row else {
        continue;
      };

      let history = read_history(&conn, user_id, card_id)?;
      let state = CardLearningState {
        repetitions,
        interval_days,
        ease_factor,
        due_date: parse_timestamp(&due_date)?,
        history,
      };
      state.validate(card_id)?;
      states.insert(card_id, state);
    }

    tracing::debug!(user_id, requested = card_ids.len(), found = states.len(), "Loaded learning states");
    Ok(states)
  }

  fn save_states(&self, user_id: &str, states: &[(CardId, CardLearningState)]) -> StoreResult<()> {
    let mut conn = try_lock(&self.pool)?;
    let tx = conn.transaction()?;

    for (card_id, state) in states {
      // An error drops the transaction, rolling back earlier cards in this batch
      let stored = read_history(&tx, user_id, *card_id)?;
      check_extends(*card_id, &stored, &state.history)?;

      tx.execute(
        r#"
        INSERT INTO learning_states (user_id, card_id, repetitions, interval_days, ease_factor, due_date)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(user_id, card_id) DO UPDATE SET
          repetitions = excluded.repetitions,
          interval_days = excluded.interval_days,
          ease_factor = excluded.ease_factor,
          due_date = excluded.due_date
        "#,
        params![
          user_id,
          card_id,
          state.repetitions,
          state.interval_days,
          state.ease_factor,
          state.due_date.to_rfc3339(),
        ],
      )?;

      for (seq, event) in state.history.iter().enumerate().skip(stored.len()) {
        let time_spent_ms = event
          .time_spent_ms
          .map(i64::try_from)
          .transpose()
          .map_err(|_| StoreError::Corrupt(format!("time_spent_ms out of range for card {card_id}")))?;
        tx.execute(
          r#"
          INSERT INTO review_events (user_id, card_id, seq, reviewed_at, outcome, time_spent_ms)
          VALUES (?1, ?2, ?3, ?4, ?5, ?6)
          "#,
          params![
            user_id,
            card_id,
            seq as i64,
            event.timestamp.to_rfc3339(),
            event.outcome.as_str(),
            time_spent_ms,
          ],
        )?;
      }
    }

    tx.commit()?;
    tracing::debug!(user_id, count = states.len(), "Saved learning states");
    Ok(())
  }

  fn reset_states(&self, user_id: &str, card_ids: &[CardId]) -> StoreResult<()> {
    let mut conn = try_lock(&self.pool)?;
    let tx = conn.transaction()?;
    for card_id in card_ids {
      tx.execute(
        "DELETE FROM review_events WHERE user_id = ?1 AND card_id = ?2",
        params![user_id, card_id],
      )?;
      tx.execute(
        "DELETE FROM learning_states WHERE user_id = ?1 AND card_id = ?2",
        params![user_id, card_id],
      )?;
    }
    tx.commit()?;
    tracing::info!(user_id, count = card_ids.len(), "Reset learning progress");
    Ok(())
  }

  fn peer_average_time_ms(&self, user_id: &str, card_id: CardId) -> StoreResult<Option<u64>> {
    let conn = try_lock(&self.pool)?;
    let average: Option<f64> = conn.query_row(
      r#"
      SELECT AVG(time_spent_ms)
      FROM review_events
      WHERE card_id = ?1 AND user_id != ?2
        AND time_spent_ms IS NOT NULL
        AND outcome != 'skip'
      "#,
      params![card_id, user_id],
      |row| row.get(0),
    )?;
    Ok(average.map(|ms| ms.round().max(0.0) as u64))
  }
}

/// Reject a write whose history does not extend the stored one: either it is
/// shorter, or it disagrees with a stored event.
pub(crate) fn check_extends(card_id: CardId, stored: &[ReviewEvent], given: &[ReviewEvent]) -> StoreResult<()> {
  if stored.len() > given.len() {
    return Err(StoreError::StaleHistory {
      card_id,
      stored: stored.len(),
      given: given.len(),
    });
  }
  match stored.iter().zip(given).position(|(kept, new)| kept != new) {
    Some(seq) => Err(StoreError::HistoryConflict { card_id, seq }),
    None => Ok(()),
  }
}

fn read_history(conn: &Connection, user_id: &str, card_id: CardId) -> StoreResult<Vec<ReviewEvent>> {
  let mut stmt = conn.prepare_cached(
    r#"
    SELECT reviewed_at, outcome, time_spent_ms
    FROM review_events
    WHERE user_id = ?1 AND card_id = ?2
    ORDER BY seq ASC
    "#,
  )?;
  let rows = stmt
    .query_map(params![user_id, card_id], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, Option<i64>>(2)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(reviewed_at, outcome, time_spent_ms)| {
      let time_spent_ms = time_spent_ms
        .map(u64::try_from)
        .transpose()
        .map_err(|_| StoreError::Corrupt(format!("negative time_spent_ms for card {card_id}")))?;
      Ok(ReviewEvent::new(
        parse_timestamp(&reviewed_at)?,
        outcome.parse::<ReviewOutcome>()?,
        time_spent_ms,
      ))
    })
    .collect()
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(value)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| StoreError::Corrupt(format!("timestamp {value:?}: {e}")))
}
