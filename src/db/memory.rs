//! In-process [`StateStore`], used by tests and throwaway sessions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::repository::{check_extends, StateStore};
use crate::domain::{CardId, CardLearningState};
use crate::error::{StoreError, StoreResult};

type StateKey = (String, CardId);

#[derive(Debug, Default)]
pub struct MemoryStateStore {
  states: Mutex<HashMap<StateKey, CardLearningState>>,
}

impl MemoryStateStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<StateKey, CardLearningState>>> {
    self.states.lock().map_err(|_| StoreError::Lock)
  }
}

impl StateStore for MemoryStateStore {
  fn load_states(&self, user_id: &str, card_ids: &[CardId]) -> StoreResult<HashMap<CardId, CardLearningState>> {
    let states = self.lock()?;
    let mut found = HashMap::new();
    for &card_id in card_ids {
      if let Some(state) = states.get(&(user_id.to_string(), card_id)) {
        state.validate(card_id)?;
        found.insert(card_id, state.clone());
      }
    }
    Ok(found)
  }

  fn save_states(&self, user_id: &str, batch: &[(CardId, CardLearningState)]) -> StoreResult<()> {
    let mut states = self.lock()?;

    // Check the whole batch first so a rejected save changes nothing
    for (card_id, state) in batch {
      if let Some(existing) = states.get(&(user_id.to_string(), *card_id)) {
        check_extends(*card_id, &existing.history, &state.history)?;
      }
    }

    for (card_id, state) in batch {
      states.insert((user_id.to_string(), *card_id), state.clone());
    }
    Ok(())
  }

  fn reset_states(&self, user_id: &str, card_ids: &[CardId]) -> StoreResult<()> {
    let mut states = self.lock()?;
    for &card_id in card_ids {
      states.remove(&(user_id.to_string(), card_id));
    }
    Ok(())
  }

  fn peer_average_time_ms(&self, user_id: &str, card_id: CardId) -> StoreResult<Option<u64>> {
    let states = self.lock()?;
    let times: Vec<u64> = states
      .iter()
      .filter(|((user, card), _)| user != user_id && *card == card_id)
      .flat_map(|(_, state)| state.history.iter())
      .filter(|event| event.outcome.is_graded())
      .filter_map(|event| event.time_spent_ms)
      .collect();

    if times.is_empty() {
      return Ok(None);
    }
    let total: u128 = times.iter().map(|&ms| ms as u128).sum();
    Ok(Some((total as f64 / times.len() as f64).round() as u64))
  }
}
