//! Persistence seams for games, import jobs and accounts.
//!
//! The ingestion pipeline only sees these traits; the Postgres
//! implementations live in [`postgres`]. Tests swap in the in-memory
//! implementations so the whole pipeline runs without a database.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::model::{Account, Game, Job, NewGame, Platform};

#[async_trait]
pub trait GameStore: Send + Sync {
    /// The hot dedup question: does (account, fingerprint) already exist?
    async fn exists(&self, account_id: i64, pgn_hash: &str) -> Result<bool>;

    /// Insert honoring the `(account_id, pgn_hash)` uniqueness atomically.
    /// Returns Ok(false) when the row already existed (duplicate), which is
    /// an expected outcome, not an error.
    async fn insert(&self, game: &NewGame) -> Result<bool>;

    async fn count_by_account(&self, account_id: i64) -> Result<i64>;

    async fn delete_by_account(&self, account_id: i64) -> Result<u64>;

    /// Page of games ordered by played_at descending.
    async fn list_by_account(
        &self,
        account_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Game>>;
}

/// Every mutation is its own committed unit of work so pollers reading the
/// job row mid-import always see fresh, untorn values. Terminal states are
/// permanent: mutations against COMPLETED/FAILED jobs are no-ops.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, account_id: i64, file_name: Option<&str>) -> Result<Job>;

    async fn get(&self, id: i64) -> Result<Option<Job>>;

    /// All jobs for an account, most recent first.
    async fn list_by_account(&self, account_id: i64) -> Result<Vec<Job>>;

    async fn set_processing(&self, id: i64) -> Result<()>;

    async fn set_total_games(&self, id: i64, total_games: i64) -> Result<()>;

    /// Enter the archive discovery phase: status PROCESSING, archive total
    /// known, zero archives processed.
    async fn begin_archive_phase(&self, id: i64, total_archives: i64) -> Result<()>;

    async fn set_archives_processed(&self, id: i64, archives_processed: i64) -> Result<()>;

    /// Flush in-memory counters. With `mirror_total`, total_games tracks
    /// processed_games, for streaming sources that never learn a total
    /// up front.
    async fn update_progress(
        &self,
        id: i64,
        processed: i64,
        duplicates: i64,
        mirror_total: bool,
    ) -> Result<()>;

    async fn mark_completed(&self, id: i64) -> Result<()>;

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<()>;

    /// True iff any job for the account is PENDING or PROCESSING.
    async fn exists_active(&self, account_id: i64) -> Result<bool>;

    async fn delete_by_account(&self, account_id: i64) -> Result<u64>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Account>>;

    async fn list(&self) -> Result<Vec<Account>>;

    /// Case-insensitive username lookup.
    async fn find_by_platform_username(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<Option<Account>>;

    async fn insert(
        &self,
        platform: Platform,
        username: &str,
        label: Option<&str>,
    ) -> Result<Account>;

    async fn update_label(&self, id: i64, label: Option<&str>) -> Result<Option<Account>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Advance last_sync_at; never moves the timestamp backwards.
    async fn set_last_sync_at(&self, id: i64, sync_time: NaiveDateTime) -> Result<()>;
}
