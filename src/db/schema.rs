use rusqlite::{Connection, Result};

pub fn run_migrations(conn: &Connection) -> Result<()> {
  conn.execute_batch(
    r#"
    CREATE TABLE IF NOT EXISTS cards (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      set_id TEXT NOT NULL,
      position INTEGER NOT NULL,
      front TEXT NOT NULL,
      back TEXT NOT NULL
    );

    -- Scheduling fields, one row per (learner, card)
    CREATE TABLE IF NOT EXISTS learning_states (
      user_id TEXT NOT NULL,
      card_id INTEGER NOT NULL,
      repetitions INTEGER NOT NULL DEFAULT 0,
      interval_days REAL NOT NULL DEFAULT 0,
      ease_factor REAL NOT NULL DEFAULT 2.5,
      due_date TEXT NOT NULL,
      PRIMARY KEY (user_id, card_id)
    );

    -- Append-only history; seq preserves order within a (learner, card)
    CREATE TABLE IF NOT EXISTS review_events (
      user_id TEXT NOT NULL,
      card_id INTEGER NOT NULL,
      seq INTEGER NOT NULL,
      reviewed_at TEXT NOT NULL,
      outcome TEXT NOT NULL,
      time_spent_ms INTEGER,
      PRIMARY KEY (user_id, card_id, seq)
    );

    CREATE INDEX IF NOT EXISTS idx_cards_set_position ON cards(set_id, position);
    CREATE INDEX IF NOT EXISTS idx_review_events_card_id ON review_events(card_id);
    "#,
  )?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table_exists(conn: &Connection, name: &str) -> bool {
    conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get::<_, i64>(0),
      )
      .map(|n| n == 1)
      .unwrap_or(false)
  }

  #[test]
  fn test_migrations_create_tables() {
    let conn = Connection::open_in_memory().unwrap();
    run_migrations(&conn).unwrap();
    assert!(table_exists(&conn, "cards"));
    assert!(table_exists(&conn, "learning_states"));
    assert!(table_exists(&conn, "review_events"));
  }

  #[test]
  fn test_migrations_idempotent() {
    let conn = Connection::open_in_memory().unwrap();
    run_migrations(&conn).unwrap();
    run_migrations(&conn).unwrap();
  }
}
