//! In-memory store implementations for tests. They enforce the same
//! invariants as the Postgres stores: unique `(account_id, pgn_hash)`,
//! write-protected terminal job states, forward-only `last_sync_at`.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use crate::model::{Account, Game, Job, JobStatus, NewGame, Platform};
use crate::store::{AccountStore, GameStore, JobStore};

#[derive(Default)]
pub struct MemoryGameStore {
    inner: Mutex<Vec<Game>>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn games(&self) -> Vec<Game> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn exists(&self, account_id: i64, pgn_hash: &str) -> Result<bool> {
        let games = self.inner.lock().unwrap();
        Ok(games
            .iter()
            .any(|g| g.account_id == account_id && g.pgn_hash == pgn_hash))
    }

    async fn insert(&self, game: &NewGame) -> Result<bool> {
        let mut games = self.inner.lock().unwrap();
        if games
            .iter()
            .any(|g| g.account_id == game.account_id && g.pgn_hash == game.pgn_hash)
        {
            return Ok(false);
        }
        let id = games.len() as i64 + 1;
        games.push(Game {
            id,
            account_id: game.account_id,
            played_at: game.played_at,
            result: game.result,
            color: game.color,
            time_control_raw: game.time_control_raw.clone(),
            time_control_category: Some(game.time_control_category),
            eco_code: game.eco_code.clone(),
            opening_name: game.opening_name.clone(),
            opponent: game.opponent.clone(),
            pgn_hash: game.pgn_hash.clone(),
            created_at: Utc::now().naive_utc(),
        });
        Ok(true)
    }

    async fn count_by_account(&self, account_id: i64) -> Result<i64> {
        let games = self.inner.lock().unwrap();
        Ok(games.iter().filter(|g| g.account_id == account_id).count() as i64)
    }

    async fn delete_by_account(&self, account_id: i64) -> Result<u64> {
        let mut games = self.inner.lock().unwrap();
        let before = games.len();
        games.retain(|g| g.account_id != account_id);
        Ok((before - games.len()) as u64)
    }

    async fn list_by_account(
        &self,
        account_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Game>> {
        let games = self.inner.lock().unwrap();
        let mut mine: Vec<Game> = games
            .iter()
            .filter(|g| g.account_id == account_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.played_at.cmp(&a.played_at).then(b.id.cmp(&a.id)));
        Ok(mine
            .into_iter()
            .skip((page * page_size) as usize)
            .take(page_size as usize)
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate_active<F: FnOnce(&mut Job)>(&self, id: i64, require_processing: bool, f: F) {
        let mut jobs = self.inner.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            let writable = if require_processing {
                job.status == JobStatus::Processing
            } else {
                job.status.is_active()
            };
            if writable {
                f(job);
            }
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, account_id: i64, file_name: Option<&str>) -> Result<Job> {
        let mut jobs = self.inner.lock().unwrap();
        let job = Job {
            id: jobs.len() as i64 + 1,
            account_id,
            file_name: file_name.map(str::to_string),
            status: JobStatus::Pending,
            total_games: None,
            processed_games: 0,
            duplicate_games: 0,
            archives_processed: None,
            total_archives: None,
            error_message: None,
            created_at: Utc::now().naive_utc(),
            completed_at: None,
        };
        jobs.push(job.clone());
        Ok(job)
    }

    async fn get(&self, id: i64) -> Result<Option<Job>> {
        let jobs = self.inner.lock().unwrap();
        Ok(jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_by_account(&self, account_id: i64) -> Result<Vec<Job>> {
        let jobs = self.inner.lock().unwrap();
        let mut mine: Vec<Job> = jobs
            .iter()
            .filter(|j| j.account_id == account_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(mine)
    }

    async fn set_processing(&self, id: i64) -> Result<()> {
        self.mutate_active(id, false, |job| job.status = JobStatus::Processing);
        Ok(())
    }

    async fn set_total_games(&self, id: i64, total_games: i64) -> Result<()> {
        self.mutate_active(id, false, |job| job.total_games = Some(total_games));
        Ok(())
    }

    async fn begin_archive_phase(&self, id: i64, total_archives: i64) -> Result<()> {
        self.mutate_active(id, false, |job| {
            job.status = JobStatus::Processing;
            job.total_archives = Some(total_archives);
            job.archives_processed = Some(0);
        });
        Ok(())
    }

    async fn set_archives_processed(&self, id: i64, archives_processed: i64) -> Result<()> {
        self.mutate_active(id, true, |job| {
            job.archives_processed = Some(archives_processed)
        });
        Ok(())
    }

    async fn update_progress(
        &self,
        id: i64,
        processed: i64,
        duplicates: i64,
        mirror_total: bool,
    ) -> Result<()> {
        self.mutate_active(id, true, |job| {
            job.processed_games = processed;
            job.duplicate_games = duplicates;
            if mirror_total {
                job.total_games = Some(processed);
            }
        });
        Ok(())
    }

    async fn mark_completed(&self, id: i64) -> Result<()> {
        self.mutate_active(id, false, |job| {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now().naive_utc());
        });
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<()> {
        self.mutate_active(id, false, |job| {
            job.status = JobStatus::Failed;
            job.error_message = Some(error_message.to_string());
            job.completed_at = Some(Utc::now().naive_utc());
        });
        Ok(())
    }

    async fn exists_active(&self, account_id: i64) -> Result<bool> {
        let jobs = self.inner.lock().unwrap();
        Ok(jobs
            .iter()
            .any(|j| j.account_id == account_id && j.status.is_active()))
    }

    async fn delete_by_account(&self, account_id: i64) -> Result<u64> {
        let mut jobs = self.inner.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.account_id != account_id);
        Ok((before - jobs.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryAccountStore {
    inner: Mutex<Vec<Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account and return it; test convenience.
    pub fn seed(&self, platform: Platform, username: &str) -> Account {
        let mut accounts = self.inner.lock().unwrap();
        let account = Account {
            id: accounts.len() as i64 + 1,
            platform,
            username: username.to_string(),
            label: None,
            created_at: Utc::now().naive_utc(),
            last_sync_at: None,
        };
        accounts.push(account.clone());
        account
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, id: i64) -> Result<Option<Account>> {
        let accounts = self.inner.lock().unwrap();
        Ok(accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>> {
        Ok(self.inner.lock().unwrap().clone())
    }

    async fn find_by_platform_username(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<Option<Account>> {
        let accounts = self.inner.lock().unwrap();
        Ok(accounts
            .iter()
            .find(|a| a.platform == platform && a.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn insert(
        &self,
        platform: Platform,
        username: &str,
        label: Option<&str>,
    ) -> Result<Account> {
        let mut accounts = self.inner.lock().unwrap();
        let account = Account {
            id: accounts.len() as i64 + 1,
            platform,
            username: username.to_string(),
            label: label.map(str::to_string),
            created_at: Utc::now().naive_utc(),
            last_sync_at: None,
        };
        accounts.push(account.clone());
        Ok(account)
    }

    async fn update_label(&self, id: i64, label: Option<&str>) -> Result<Option<Account>> {
        let mut accounts = self.inner.lock().unwrap();
        if let Some(account) = accounts.iter_mut().find(|a| a.id == id) {
            account.label = label.map(str::to_string);
            return Ok(Some(account.clone()));
        }
        Ok(None)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut accounts = self.inner.lock().unwrap();
        let before = accounts.len();
        accounts.retain(|a| a.id != id);
        Ok(accounts.len() < before)
    }

    async fn set_last_sync_at(&self, id: i64, sync_time: NaiveDateTime) -> Result<()> {
        let mut accounts = self.inner.lock().unwrap();
        if let Some(account) = accounts.iter_mut().find(|a| a.id == id) {
            account.last_sync_at = Some(match account.last_sync_at {
                Some(prev) => prev.max(sync_time),
                None => sync_time,
            });
        }
        Ok(())
    }
}
