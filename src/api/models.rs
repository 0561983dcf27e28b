// API request/response models (DTOs)

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::model::{
    Account, Color, Game, GameResult, Job, JobStatus, Platform, TimeControlCategory,
};

/// Error body for 4xx/5xx responses: a stable machine code plus a
/// human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub platform: Platform,
    pub username: String,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub platform: Platform,
    pub username: String,
    pub label: Option<String>,
    pub created_at: NaiveDateTime,
    pub last_sync_at: Option<NaiveDateTime>,
    pub games_count: i64,
}

impl AccountResponse {
    pub fn from(account: Account, games_count: i64) -> Self {
        Self {
            id: account.id,
            platform: account.platform,
            username: account.username,
            label: account.label,
            created_at: account.created_at,
            last_sync_at: account.last_sync_at,
            games_count,
        }
    }
}

/// Job as seen by pollers. `progress_percent` is derived, never stored.
#[derive(Debug, Serialize)]
pub struct JobResponse {
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
    pub progress_percent: Option<i64>,
}

impl JobResponse {
    pub fn from(job: Job) -> Self {
        let progress_percent = match job.total_games {
            Some(total) if total > 0 => Some(job.processed_games * 100 / total),
            _ => None,
        };
        Self {
            id: job.id,
            account_id: job.account_id,
            file_name: job.file_name,
            status: job.status,
            total_games: job.total_games,
            processed_games: job.processed_games,
            duplicate_games: job.duplicate_games,
            archives_processed: job.archives_processed,
            total_archives: job.total_archives,
            error_message: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
            progress_percent,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GameResponse {
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
}

impl GameResponse {
    pub fn from(game: Game) -> Self {
        Self {
            id: game.id,
            account_id: game.account_id,
            played_at: game.played_at,
            result: game.result,
            color: game.color,
            time_control_raw: game.time_control_raw,
            time_control_category: game.time_control_category,
            eco_code: game.eco_code,
            opening_name: game.opening_name,
            opponent: game.opponent,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Shared analytics filter query. `account_ids` is comma-separated.
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub account_ids: Option<String>,
    pub time_control: Option<TimeControlCategory>,
    pub color: Option<Color>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl AnalyticsQuery {
    /// Parse the comma-separated id list; garbage entries are ignored.
    pub fn parsed_account_ids(&self) -> Option<Vec<i64>> {
        let raw = self.account_ids.as_deref()?;
        let ids: Vec<i64> = raw
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect();
        if ids.is_empty() {
            None
        } else {
            Some(ids)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}
