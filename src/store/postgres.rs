//! sqlx/Postgres implementations of the store traits. All three share one
//! pool; every method is a single auto-committed statement so long imports
//! never hold locks across games.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::db::Db;
use crate::model::{Account, Game, Job, NewGame, Platform};
use crate::store::{AccountStore, GameStore, JobStore};

/// error_message column is VARCHAR(1000).
const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

#[derive(Clone)]
pub struct PgGameStore {
    db: Db,
}

impl PgGameStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn exists(&self, account_id: i64, pgn_hash: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM game WHERE account_id = $1 AND pgn_hash = $2)",
        )
        .bind(account_id)
        .bind(pgn_hash)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(exists)
    }

    async fn insert(&self, game: &NewGame) -> Result<bool> {
        // ON CONFLICT DO NOTHING makes the dedup check race-free: a
        // concurrent insert of the same fingerprint simply reports 0 rows.
        let result = sqlx::query(
            "INSERT INTO game (account_id, played_at, result, color, time_control_raw, \
             time_control_category, eco_code, opening_name, opponent, pgn_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT ON CONSTRAINT uk_game_account_hash DO NOTHING",
        )
        .bind(game.account_id)
        .bind(game.played_at)
        .bind(game.result)
        .bind(game.color)
        .bind(&game.time_control_raw)
        .bind(game.time_control_category)
        .bind(&game.eco_code)
        .bind(&game.opening_name)
        .bind(&game.opponent)
        .bind(&game.pgn_hash)
        .execute(&self.db.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_by_account(&self, account_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM game WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(&self.db.pool)
            .await?;
        Ok(count)
    }

    async fn delete_by_account(&self, account_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM game WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_by_account(
        &self,
        account_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Game>> {
        let games = sqlx::query_as::<_, Game>(
            "SELECT * FROM game WHERE account_id = $1 \
             ORDER BY played_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(account_id)
        .bind(page_size)
        .bind(page * page_size)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(games)
    }
}

#[derive(Clone)]
pub struct PgJobStore {
    db: Db,
}

impl PgJobStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, account_id: i64, file_name: Option<&str>) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(
            "INSERT INTO import_job (account_id, file_name) VALUES ($1, $2) RETURNING *",
        )
        .bind(account_id)
        .bind(file_name)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(job)
    }

    async fn get(&self, id: i64) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM import_job WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(job)
    }

    async fn list_by_account(&self, account_id: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM import_job WHERE account_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(account_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(jobs)
    }

    async fn set_processing(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE import_job SET status = 'PROCESSING' \
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(id)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn set_total_games(&self, id: i64, total_games: i64) -> Result<()> {
        sqlx::query(
            "UPDATE import_job SET total_games = $2 \
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(id)
        .bind(total_games)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn begin_archive_phase(&self, id: i64, total_archives: i64) -> Result<()> {
        sqlx::query(
            "UPDATE import_job SET status = 'PROCESSING', total_archives = $2, \
             archives_processed = 0 \
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(id)
        .bind(total_archives)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn set_archives_processed(&self, id: i64, archives_processed: i64) -> Result<()> {
        sqlx::query(
            "UPDATE import_job SET archives_processed = $2 \
             WHERE id = $1 AND status = 'PROCESSING'",
        )
        .bind(id)
        .bind(archives_processed)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn update_progress(
        &self,
        id: i64,
        processed: i64,
        duplicates: i64,
        mirror_total: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE import_job SET processed_games = $2, duplicate_games = $3, \
             total_games = CASE WHEN $4 THEN $2 ELSE total_games END \
             WHERE id = $1 AND status = 'PROCESSING'",
        )
        .bind(id)
        .bind(processed)
        .bind(duplicates)
        .bind(mirror_total)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn mark_completed(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE import_job SET status = 'COMPLETED', \
             completed_at = (now() AT TIME ZONE 'utc') \
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(id)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<()> {
        let message: String = error_message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        sqlx::query(
            "UPDATE import_job SET status = 'FAILED', error_message = $2, \
             completed_at = (now() AT TIME ZONE 'utc') \
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(id)
        .bind(message)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn exists_active(&self, account_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM import_job \
             WHERE account_id = $1 AND status IN ('PENDING', 'PROCESSING'))",
        )
        .bind(account_id)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(exists)
    }

    async fn delete_by_account(&self, account_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM import_job WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgAccountStore {
    db: Db,
}

impl PgAccountStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get(&self, id: i64) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM account WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(account)
    }

    async fn list(&self) -> Result<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>("SELECT * FROM account ORDER BY id")
            .fetch_all(&self.db.pool)
            .await?;
        Ok(accounts)
    }

    async fn find_by_platform_username(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM account WHERE platform = $1 AND lower(username) = lower($2)",
        )
        .bind(platform)
        .bind(username)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(account)
    }

    async fn insert(
        &self,
        platform: Platform,
        username: &str,
        label: Option<&str>,
    ) -> Result<Account> {
        let account = sqlx::query_as::<_, Account>(
            "INSERT INTO account (platform, username, label) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(platform)
        .bind(username)
        .bind(label)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(account)
    }

    async fn update_label(&self, id: i64, label: Option<&str>) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "UPDATE account SET label = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(label)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(account)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM account WHERE id = $1")
            .bind(id)
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_last_sync_at(&self, id: i64, sync_time: NaiveDateTime) -> Result<()> {
        // last_sync_at only moves forward.
        sqlx::query(
            "UPDATE account SET last_sync_at = GREATEST(COALESCE(last_sync_at, $2), $2) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(sync_time)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }
}
