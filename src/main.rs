use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spaced_study::db::{self, DbPool, SqliteStateStore, StateStore};
use spaced_study::domain::{CardId, ReviewOutcome};
use spaced_study::session::{self, StudySession};
use spaced_study::{config, srs};

#[derive(Parser)]
#[command(name = "spaced-study")]
#[command(about = "Spaced-repetition study from the terminal", long_about = None)]
struct Cli {
  /// Learner the command acts for
  #[arg(short, long, global = true, default_value = "default")]
  user: String,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Append a card to a set
  AddCard { set: String, front: String, back: String },
  /// Delete a card with all learners' progress on it
  RemoveCard { card_id: CardId },
  /// List sets with card counts
  Sets,
  /// Print the study queue for a set
  Queue {
    set: String,
    #[arg(long)]
    max_new: Option<usize>,
    #[arg(long)]
    max_review: Option<usize>,
    /// Interleave new cards with overdue ones
    #[arg(long)]
    no_prioritize: bool,
    #[arg(long)]
    json: bool,
  },
  /// Record one review outcome (forgot, hard, good, skip)
  Review {
    card_id: CardId,
    outcome: String,
    /// Time spent answering, in milliseconds
    #[arg(short, long)]
    time_ms: Option<u64>,
  },
  /// Aggregate statistics for a set
  Stats {
    set: String,
    #[arg(long)]
    json: bool,
  },
  /// Forget all progress on a set
  Reset { set: String },
  /// Interactive study session
  Study { set: String },
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "spaced_study=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
    .init();

  let cli = Cli::parse();

  let db_path = config::load_database_path();
  let pool = db::init_db(&db_path).with_context(|| format!("Failed to open {}", db_path.display()))?;
  let store = SqliteStateStore::new(pool.clone());
  let user = cli.user.as_str();

  match cli.command {
    Commands::AddCard { set, front, back } => {
      let conn = db::try_lock(&pool)?;
      let card = db::add_card_to_set(&conn, &set, &front, &back)?;
      println!("Added card {} to {} at position {}", card.id, card.set_id, card.position);
    }
    Commands::RemoveCard { card_id } => {
      let mut conn = db::try_lock(&pool)?;
      if db::delete_card(&mut conn, card_id)? {
        println!("Removed card {card_id}");
      } else {
        anyhow::bail!("No card with id {card_id}");
      }
    }
    Commands::Sets => {
      let conn = db::try_lock(&pool)?;
      for (set_id, count) in db::list_sets(&conn)? {
        println!("{set_id}\t{count}");
      }
    }
    Commands::Queue {
      set,
      max_new,
      max_review,
      no_prioritize,
      json,
    } => {
      let mut options = config::load_queue_options();
      if let Some(max_new) = max_new {
        options.max_new_cards = max_new;
      }
      if let Some(max_review) = max_review {
        options.max_review_cards = max_review;
      }
      if no_prioritize {
        options.prioritize_overdue = false;
      }

      let now = Utc::now();
      let cards = load_set(&pool, &set)?;
      let ids: Vec<CardId> = cards.iter().map(|c| c.id).collect();
      let states = store.load_states(user, &ids)?;
      let queue = srs::build_study_queue(&cards, &states, &options, now);

      if json {
        println!("{}", serde_json::to_string_pretty(&queue)?);
      } else {
        for entry in &queue {
          println!(
            "{:>6}  {:<8} {:>5.0}%  {:>6}  {}",
            entry.card.id,
            entry.category.as_str(),
            entry.progress * 100.0,
            srs::format_interval(entry.due_in_days),
            entry.card.front
          );
        }
      }
    }
    Commands::Review {
      card_id,
      outcome,
      time_ms,
    } => {
      let outcome: ReviewOutcome = outcome.parse()?;
      let conn = db::try_lock(&pool)?;
      let exists = db::get_card_by_id(&conn, card_id)?.is_some();
      drop(conn);
      if !exists {
        anyhow::bail!("No card with id {card_id}");
      }

      let state = session::grade_card(&store, user, card_id, outcome, time_ms, Utc::now())?;
      println!(
        "Card {card_id}: next review in {} (ease {:.2}, {} repetitions)",
        srs::format_interval(state.interval_days),
        state.ease_factor,
        state.repetitions
      );
    }
    Commands::Stats { set, json } => {
      let cards = load_set(&pool, &set)?;
      let ids: Vec<CardId> = cards.iter().map(|c| c.id).collect();
      let now = Utc::now();
      let mut states = store.load_states(user, &ids)?;
      // Cards never reviewed have no stored state but still count as new
      for id in &ids {
        states.entry(*id).or_insert_with(|| srs::initialize_learning_state(now));
      }
      let stats = srs::generate_study_stats(states.values(), now);

      if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
      } else {
        println!("Total:     {}", stats.total_cards);
        println!("New:       {}", stats.new_cards);
        println!("Learning:  {}", stats.learning_cards);
        println!("Mature:    {}", stats.mature_cards);
        println!("Mastered:  {}", stats.mastered_cards);
        println!("Overdue:   {}", stats.overdue_cards);
        println!("Avg ease:  {:.2}", stats.average_ease);
        println!("Avg ivl:   {}", srs::format_interval(stats.average_interval));
        println!("Retention: {:.0}%", stats.retention * 100.0);
      }
    }
    Commands::Reset { set } => {
      let ids: Vec<CardId> = load_set(&pool, &set)?.iter().map(|c| c.id).collect();
      session::reset_progress(&store, user, &ids)?;
      println!("Reset {} cards in {set}", ids.len());
    }
    Commands::Study { set } => {
      let cards = load_set(&pool, &set)?;
      let options = config::load_queue_options();
      let mut study = StudySession::start(&store, user, cards, &options, Utc::now())?;
      run_interactive(&store, &mut study)?;
    }
  }

  Ok(())
}

fn load_set(pool: &DbPool, set_id: &str) -> anyhow::Result<Vec<spaced_study::domain::Card>> {
  let conn = db::try_lock(pool)?;
  let cards = db::get_cards_by_set(&conn, set_id)?;
  if cards.is_empty() {
    anyhow::bail!("Set {set_id} has no cards");
  }
  Ok(cards)
}

fn run_interactive<S: StateStore>(store: &S, study: &mut StudySession) -> anyhow::Result<()> {
  let stdin = io::stdin();
  let mut lines = stdin.lock().lines();
  let mut stdout = io::stdout();

  while let Some(card) = study.next_card() {
    let (card_id, front, back) = (card.id, card.front.clone(), card.back.clone());
    let shown = Instant::now();

    writeln!(stdout, "\n{front}")?;
    write!(stdout, "[enter to reveal, q to quit] ")?;
    stdout.flush()?;
    match lines.next().transpose()? {
      Some(line) if line.trim() == "q" => break,
      Some(_) => {}
      None => break,
    }
    let time_spent_ms = u64::try_from(shown.elapsed().as_millis()).ok();

    let now = Utc::now();
    let state = store
      .load_state(&study.user_id, card_id)?
      .unwrap_or_else(|| srs::initialize_learning_state(now));
    let preview = srs::preview_intervals(&state, now);
    writeln!(stdout, "{back}")?;

    let outcome = loop {
      write!(
        stdout,
        "(f)orgot {}  (h)ard {}  (g)ood {}  (s)kip: ",
        srs::format_interval(preview.forgot),
        srs::format_interval(preview.hard),
        srs::format_interval(preview.good)
      )?;
      stdout.flush()?;
      let Some(line) = lines.next().transpose()? else {
        return finish(study);
      };
      match parse_answer(&line) {
        Some(outcome) => break outcome,
        None => writeln!(stdout, "Unrecognized answer: {}", line.trim())?,
      }
    };

    let timed = if outcome.is_graded() { time_spent_ms } else { None };
    if let Some(state) = study.grade(store, outcome, timed, Utc::now())? {
      writeln!(stdout, "Next review in {}", srs::format_interval(state.interval_days))?;
    }
  }

  finish(study)
}

fn finish(study: &StudySession) -> anyhow::Result<()> {
  let stats = study.stats();
  println!(
    "\nSession done: {} good, {} hard, {} forgot, {} skipped ({:.0}% accuracy)",
    stats.good,
    stats.hard,
    stats.forgot,
    stats.skipped,
    stats.accuracy() * 100.0
  );
  Ok(())
}

/// Single-letter shortcuts or full outcome names
fn parse_answer(input: &str) -> Option<ReviewOutcome> {
  match input.trim().to_lowercase().as_str() {
    "f" => Some(ReviewOutcome::Forgot),
    "h" => Some(ReviewOutcome::Hard),
    "g" => Some(ReviewOutcome::Good),
    "s" => Some(ReviewOutcome::Skip),
    other => other.parse().ok(),
  }
}
