//! Ingestion coordinator: drives a single logical import of games through
//! discovery, rate-limited fetch, streaming parse, dedup and persistence,
//! while keeping the job row fresh for pollers.
//!
//! Each enqueue operation persists a PENDING job synchronously, hands the
//! pipeline to a background task and returns; the HTTP layer answers 202
//! with the job for progress polling. A job is owned by exactly one worker
//! until it reaches a terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::fetch::FetchError;
use crate::model::{Account, Job, Platform};
use crate::pgn::ParsedGame;
use crate::sources::chesscom::{self, ChessComSource};
use crate::sources::file as file_source;
use crate::sources::lichess::LichessSource;
use crate::store::{AccountStore, GameStore, JobStore};

/// Counter-flush cadence: file parsing is cheap per game, API sources are
/// dominated by network time.
const FILE_PROGRESS_INTERVAL: usize = 50;
const API_PROGRESS_INTERVAL: usize = 100;

/// Synchronous rejections surfaced to the HTTP layer at enqueue time.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("This account is not a {expected} account")]
    WrongPlatform { expected: &'static str },
    #[error("An import is already in progress for this account")]
    ImportInProgress,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct IngestionCoordinator {
    games: Arc<dyn GameStore>,
    jobs: Arc<dyn JobStore>,
    accounts: Arc<dyn AccountStore>,
    shutdown: broadcast::Sender<()>,
    chesscom_base: Option<String>,
    lichess_base: Option<String>,
}

impl IngestionCoordinator {
    pub fn new(
        games: Arc<dyn GameStore>,
        jobs: Arc<dyn JobStore>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            games,
            jobs,
            accounts,
            shutdown,
            chesscom_base: None,
            lichess_base: None,
        }
    }

    /// Point the Chess.com adapter at a non-default endpoint (staging, local
    /// stub).
    pub fn with_chesscom_base(mut self, base_url: impl Into<String>) -> Self {
        self.chesscom_base = Some(base_url.into());
        self
    }

    /// Point the Lichess adapter at a non-default endpoint.
    pub fn with_lichess_base(mut self, base_url: impl Into<String>) -> Self {
        self.lichess_base = Some(base_url.into());
        self
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn games(&self) -> &Arc<dyn GameStore> {
        &self.games
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    /// Ask all running workers to stop; each marks its job FAILED with
    /// "Request interrupted" before exiting.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Enqueue processing of an uploaded PGN file already saved to disk.
    pub async fn enqueue_file_import(
        &self,
        account: &Account,
        stored_path: PathBuf,
        original_name: &str,
    ) -> Result<Job> {
        let job = self.jobs.create(account.id, Some(original_name)).await?;
        info!(
            job_id = job.id,
            account = %account.username,
            file = original_name,
            "enqueued file import"
        );

        let this = self.clone();
        let account = account.clone();
        let job_id = job.id;
        self.spawn_worker(job_id, async move {
            this.run_file_import(job_id, account, stored_path).await
        });
        Ok(job)
    }

    /// Enqueue a Chess.com archive sync. Rejected when the account is not a
    /// Chess.com account or another import is still active.
    pub async fn enqueue_chesscom_import(&self, account: &Account) -> Result<Job, EnqueueError> {
        if account.platform != Platform::ChessCom {
            return Err(EnqueueError::WrongPlatform {
                expected: Platform::ChessCom.display_name(),
            });
        }
        self.ensure_no_active_import(account.id).await?;

        let job = self
            .jobs
            .create(account.id, Some("Chess.com API Import"))
            .await?;
        info!(job_id = job.id, account = %account.username, "enqueued Chess.com import");

        let this = self.clone();
        let account = account.clone();
        let job_id = job.id;
        self.spawn_worker(job_id, async move {
            this.run_chesscom_import(job_id, account).await
        });
        Ok(job)
    }

    /// Enqueue a Lichess streaming sync; same rejections as Chess.com.
    pub async fn enqueue_lichess_import(&self, account: &Account) -> Result<Job, EnqueueError> {
        if account.platform != Platform::Lichess {
            return Err(EnqueueError::WrongPlatform {
                expected: Platform::Lichess.display_name(),
            });
        }
        self.ensure_no_active_import(account.id).await?;

        let job = self
            .jobs
            .create(account.id, Some("Lichess API Import"))
            .await?;
        info!(job_id = job.id, account = %account.username, "enqueued Lichess import");

        let this = self.clone();
        let account = account.clone();
        let job_id = job.id;
        self.spawn_worker(job_id, async move {
            this.run_lichess_import(job_id, account).await
        });
        Ok(job)
    }

    async fn ensure_no_active_import(&self, account_id: i64) -> Result<(), EnqueueError> {
        if self
            .jobs
            .exists_active(account_id)
            .await
            .map_err(EnqueueError::Internal)?
        {
            return Err(EnqueueError::ImportInProgress);
        }
        Ok(())
    }

    /// Run the pipeline on a background task, racing it against shutdown.
    /// Any error that escapes the pipeline marks the job FAILED with the
    /// error's message; that status is the only failure channel pollers see.
    fn spawn_worker(
        &self,
        job_id: i64,
        pipeline: impl std::future::Future<Output = Result<()>> + Send + 'static,
    ) {
        let jobs = self.jobs.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                result = pipeline => {
                    if let Err(err) = result {
                        error!(job_id, error = %err, "import job failed");
                        if let Err(store_err) = jobs.mark_failed(job_id, &err.to_string()).await {
                            error!(job_id, error = %store_err, "failed to record job failure");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    warn!(job_id, "shutdown requested, interrupting import");
                    let _ = jobs.mark_failed(job_id, "Request interrupted").await;
                }
            }
        });
    }

    async fn run_file_import(&self, job_id: i64, account: Account, path: PathBuf) -> Result<()> {
        info!(job_id, account = %account.username, "starting file import");
        self.jobs.set_processing(job_id).await?;

        let total = file_source::count(&path).await?;
        self.jobs.set_total_games(job_id, total as i64).await?;
        info!(job_id, total, "counted games in upload");

        let mut tracker = ProgressTracker::new(
            self.jobs.clone(),
            job_id,
            FILE_PROGRESS_INTERVAL,
            false,
        );
        let mut stream = file_source::open_stream(&path, &account.username).await?;
        while let Some(parsed) = stream.next_game().await? {
            self.ingest_game(&account, parsed, &mut tracker).await?;
        }

        tracker.flush().await?;
        self.jobs.mark_completed(job_id).await?;
        info!(
            job_id,
            processed = tracker.processed,
            duplicates = tracker.duplicates,
            "file import completed"
        );
        Ok(())
    }

    async fn run_chesscom_import(&self, job_id: i64, account: Account) -> Result<()> {
        info!(job_id, account = %account.username, "starting Chess.com import");
        let sync_started_at = Utc::now().naive_utc();

        let mut source = ChessComSource::new(&account.username, self.chesscom_base.as_deref())?;
        let all_archives = source.fetch_archive_list().await.map_err(|err| match err {
            FetchError::NotFound { .. } => {
                anyhow!("User not found on Chess.com: {}", account.username)
            }
            other => anyhow!(other),
        })?;
        let archives = chesscom::filter_archives_since(all_archives.clone(), account.last_sync_at);
        info!(
            job_id,
            total = all_archives.len(),
            kept = archives.len(),
            last_sync = ?account.last_sync_at,
            "archive list filtered"
        );

        self.jobs
            .begin_archive_phase(job_id, archives.len() as i64)
            .await?;

        let mut tracker = ProgressTracker::new(
            self.jobs.clone(),
            job_id,
            API_PROGRESS_INTERVAL,
            false,
        );
        let mut games_seen: i64 = 0;
        let mut archives_done: i64 = 0;

        for archive_url in &archives {
            // One bad month must not sink the whole sync.
            if let Err(err) = self
                .process_archive(&mut source, &account, archive_url, &mut tracker, &mut games_seen)
                .await
            {
                warn!(
                    job_id,
                    archive = %archive_url,
                    error = %err,
                    "failed to process archive, continuing"
                );
            }
            archives_done += 1;
            self.jobs
                .set_archives_processed(job_id, archives_done)
                .await?;
        }

        tracker.flush().await?;
        self.accounts
            .set_last_sync_at(account.id, sync_started_at)
            .await?;
        self.jobs.mark_completed(job_id).await?;
        info!(
            job_id,
            archives = archives_done,
            processed = tracker.processed,
            duplicates = tracker.duplicates,
            "Chess.com import completed"
        );
        Ok(())
    }

    async fn process_archive(
        &self,
        source: &mut ChessComSource,
        account: &Account,
        archive_url: &str,
        tracker: &mut ProgressTracker,
        games_seen: &mut i64,
    ) -> Result<()> {
        let pgns = source.fetch_archive_games(archive_url).await?;
        *games_seen += pgns.len() as i64;
        // Total grows as archives are discovered; it only ever increases.
        self.jobs.set_total_games(tracker.job_id, *games_seen).await?;

        for pgn_text in pgns {
            if let Some(parsed) = source.parse_game(&pgn_text) {
                self.ingest_game(account, parsed, tracker).await?;
            }
        }
        Ok(())
    }

    async fn run_lichess_import(&self, job_id: i64, account: Account) -> Result<()> {
        info!(job_id, account = %account.username, "starting Lichess import");
        let sync_started_at = Utc::now().naive_utc();
        self.jobs.set_processing(job_id).await?;

        let mut source = LichessSource::new(&account.username, self.lichess_base.as_deref())?;
        let mut stream = source
            .open_stream(account.last_sync_at)
            .await
            .map_err(|err| match err {
                FetchError::NotFound { .. } => {
                    anyhow!("User not found on Lichess: {}", account.username)
                }
                other => anyhow!(other),
            })?;

        // No total is known up front; total mirrors processed on each flush
        // so pollers can render "N processed".
        let mut tracker =
            ProgressTracker::new(self.jobs.clone(), job_id, API_PROGRESS_INTERVAL, true);
        while let Some(parsed) = stream.next_game().await? {
            self.ingest_game(&account, parsed, &mut tracker).await?;
        }

        tracker.flush().await?;
        self.accounts
            .set_last_sync_at(account.id, sync_started_at)
            .await?;
        self.jobs.mark_completed(job_id).await?;
        info!(
            job_id,
            processed = tracker.processed,
            duplicates = tracker.duplicates,
            "Lichess import completed"
        );
        Ok(())
    }

    /// Dedup-check then insert. A unique-constraint conflict on insert is
    /// counted as a duplicate: two games inside one batch can share a
    /// fingerprint, so the pre-check alone is not enough.
    async fn ingest_game(
        &self,
        account: &Account,
        parsed: ParsedGame,
        tracker: &mut ProgressTracker,
    ) -> Result<()> {
        let game = parsed.into_new_game(account.id);
        let duplicate = if self.games.exists(account.id, &game.pgn_hash).await? {
            true
        } else {
            !self.games.insert(&game).await?
        };
        tracker.record(duplicate).await
    }
}

/// In-memory counters flushed to the job store every `interval` games, each
/// flush its own unit of work so pollers never see torn counter pairs.
struct ProgressTracker {
    jobs: Arc<dyn JobStore>,
    job_id: i64,
    processed: i64,
    duplicates: i64,
    pending: usize,
    interval: usize,
    mirror_total: bool,
}

impl ProgressTracker {
    fn new(jobs: Arc<dyn JobStore>, job_id: i64, interval: usize, mirror_total: bool) -> Self {
        Self {
            jobs,
            job_id,
            processed: 0,
            duplicates: 0,
            pending: 0,
            interval,
            mirror_total,
        }
    }

    async fn record(&mut self, duplicate: bool) -> Result<()> {
        self.processed += 1;
        if duplicate {
            self.duplicates += 1;
        }
        self.pending += 1;
        if self.pending >= self.interval {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.pending = 0;
        self.jobs
            .update_progress(self.job_id, self.processed, self.duplicates, self.mirror_total)
            .await
    }
}
