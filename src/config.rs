//! Application configuration constants.
//!
//! Centralizes study limits and session settings, plus loading of the
//! optional `config.toml` file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::paths;
use crate::srs::QueueOptions;

// ==================== Config File ====================

pub const CONFIG_FILE: &str = "config.toml";

/// Configuration file structure for config.toml
#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    database: Option<DatabaseConfig>,
    study: Option<StudyConfig>,
}

#[derive(Debug, Deserialize)]
struct DatabaseConfig {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StudyConfig {
    max_new_cards: Option<usize>,
    max_review_cards: Option<usize>,
    prioritize_overdue: Option<bool>,
}

fn read_config_file(path: &Path) -> Option<AppConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&contents) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

// ==================== Database Configuration ====================

/// Load database path with priority: config.toml > .env > default
pub fn load_database_path() -> PathBuf {
    load_database_path_from(Path::new(CONFIG_FILE))
}

pub fn load_database_path_from(config_path: &Path) -> PathBuf {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Priority 1: config.toml
    if let Some(path) = read_config_file(config_path)
        .and_then(|c| c.database)
        .and_then(|db| db.path)
    {
        tracing::info!("Using database from {}: {}", config_path.display(), path);
        return PathBuf::from(path);
    }

    // Priority 2: .env DATABASE_PATH
    if let Ok(path) = std::env::var("DATABASE_PATH") {
        tracing::info!("Using database from DATABASE_PATH env: {}", path);
        return PathBuf::from(path);
    }

    // Default
    let default = PathBuf::from(paths::db_path());
    tracing::info!("Using default database path: {}", default.display());
    default
}

// ==================== Study Configuration ====================

/// Default cap on never-seen cards per session
pub const DEFAULT_MAX_NEW_CARDS: usize = 20;

/// Default cap on the whole session queue
pub const DEFAULT_MAX_REVIEW_CARDS: usize = 100;

/// Queue limits from config.toml `[study]`, falling back to defaults per field
pub fn load_queue_options() -> QueueOptions {
    load_queue_options_from(Path::new(CONFIG_FILE))
}

pub fn load_queue_options_from(config_path: &Path) -> QueueOptions {
    let defaults = QueueOptions::default();
    let Some(study) = read_config_file(config_path).and_then(|c| c.study) else {
        return defaults;
    };

    QueueOptions {
        max_new_cards: study.max_new_cards.unwrap_or(defaults.max_new_cards),
        max_review_cards: study.max_review_cards.unwrap_or(defaults.max_review_cards),
        prioritize_overdue: study.prioritize_overdue.unwrap_or(defaults.prioritize_overdue),
    }
}

// ==================== Session Configuration ====================

/// Regular cards shown before a failed card comes back
pub const REINFORCEMENT_GAP: u32 = 3;
