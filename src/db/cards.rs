//! Card persistence. Cards are authored content; scheduling data lives in
//! `learning_states` and `review_events`.

use rusqlite::{params, Connection, OptionalExtension, Result};

use crate::domain::{Card, CardId};

pub fn insert_card(conn: &Connection, card: &Card) -> Result<CardId> {
  conn.execute(
    "INSERT INTO cards (set_id, position, front, back) VALUES (?1, ?2, ?3, ?4)",
    params![card.set_id, card.position, card.front, card.back],
  )?;
  Ok(conn.last_insert_rowid())
}

/// Append a card at the end of its set
pub fn add_card_to_set(conn: &Connection, set_id: &str, front: &str, back: &str) -> Result<Card> {
  let position: u32 = conn.query_row(
    "SELECT COALESCE(MAX(position) + 1, 0) FROM cards WHERE set_id = ?1",
    params![set_id],
    |row| row.get(0),
  )?;

  let mut card = Card::new(set_id.to_string(), position, front.to_string(), back.to_string());
  card.id = insert_card(conn, &card)?;
  Ok(card)
}

pub fn get_card_by_id(conn: &Connection, id: CardId) -> Result<Option<Card>> {
  conn
    .query_row(
      "SELECT id, set_id, position, front, back FROM cards WHERE id = ?1",
      params![id],
      row_to_card,
    )
    .optional()
}

/// Cards of a set in authoring order
pub fn get_cards_by_set(conn: &Connection, set_id: &str) -> Result<Vec<Card>> {
  let mut stmt = conn.prepare(
    r#"
    SELECT id, set_id, position, front, back
    FROM cards
    WHERE set_id = ?1
    ORDER BY position ASC, id ASC
    "#,
  )?;

  let cards = stmt
    .query_map(params![set_id], row_to_card)?
    .collect::<Result<Vec<_>>>()?;
  Ok(cards)
}

/// All set ids with their card counts
pub fn list_sets(conn: &Connection) -> Result<Vec<(String, i64)>> {
  let mut stmt = conn.prepare("SELECT set_id, COUNT(*) FROM cards GROUP BY set_id ORDER BY set_id")?;
  let sets = stmt
    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
    .collect::<Result<Vec<_>>>()?;
  Ok(sets)
}

/// Delete a card together with every learner's state and history for it
pub fn delete_card(conn: &mut Connection, id: CardId) -> Result<bool> {
  let tx = conn.transaction()?;
  tx.execute("DELETE FROM review_events WHERE card_id = ?1", params![id])?;
  tx.execute("DELETE FROM learning_states WHERE card_id = ?1", params![id])?;
  let deleted = tx.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
  tx.commit()?;
  Ok(deleted > 0)
}

fn row_to_card(row: &rusqlite::Row) -> Result<Card> {
  Ok(Card {
    id: row.get(0)?,
    set_id: row.get(1)?,
    position: row.get(2)?,
    front: row.get(3)?,
    back: row.get(4)?,
  })
}
