//! Domain model: accounts, import jobs and normalized games.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Chess platform an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "platform", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    ChessCom,
    Lichess,
    Other,
}

impl Platform {
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::ChessCom => "Chess.com",
            Platform::Lichess => "Lichess",
            Platform::Other => "Other",
        }
    }
}

/// Side the account holder played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "color", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Color {
    White,
    Black,
}

/// Game outcome from the account holder's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "game_result", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "time_control_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeControlCategory {
    Ultrabullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Correspondence,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// PENDING and PROCESSING jobs still own their account.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

/// A player identity on a platform. Usernames compare case-insensitively.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub platform: Platform,
    pub username: String,
    pub label: Option<String>,
    pub created_at: NaiveDateTime,
    pub last_sync_at: Option<NaiveDateTime>,
}

/// One logical import of games for one account, observable by pollers.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub account_id: i64,
    pub file_name: Option<String>,
    pub status: JobStatus,
    pub total_games: Option<i64>,
    pub processed_games: i64,
    pub duplicate_games: i64,
    pub archives_processed: Option<i64>,
    pub total_archives: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

/// A persisted game row. Written once after the dedup check, never updated.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Game {
    pub id: i64,
    pub account_id: i64,
    pub played_at: NaiveDateTime,
    pub result: GameResult,
    pub color: Color,
    pub time_control_raw: Option<String>,
    pub time_control_category: Option<TimeControlCategory>,
    pub eco_code: Option<String>,
    pub opening_name: Option<String>,
    pub opponent: Option<String>,
    pub pgn_hash: String,
    pub created_at: NaiveDateTime,
}

/// Insertable game record (id and created_at assigned by the store).
#[derive(Debug, Clone, PartialEq)]
pub struct NewGame {
    pub account_id: i64,
    pub played_at: NaiveDateTime,
    pub result: GameResult,
    pub color: Color,
    pub time_control_raw: Option<String>,
    pub time_control_category: TimeControlCategory,
    pub eco_code: Option<String>,
    pub opening_name: Option<String>,
    pub opponent: Option<String>,
    pub pgn_hash: String,
}
