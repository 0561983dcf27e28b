use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use chess_analytics::accounts::AccountService;
use chess_analytics::api::server::AppState;
use chess_analytics::api::ApiServer;
use chess_analytics::config::AppConfig;
use chess_analytics::db::Db;
use chess_analytics::ingest::IngestionCoordinator;
use chess_analytics::store::postgres::{PgAccountStore, PgGameStore, PgJobStore};
use chess_analytics::store::{AccountStore, GameStore, JobStore};
use chess_analytics::util::env as env_util;

#[tokio::main]
async fn main() -> Result<()> {
    // --- logging -------------------------------------------------------------
    env_util::init_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // --- DB connect ----------------------------------------------------------
    let db = Db::connect(&config.database_url, config.db_max_connections)
        .await
        .context("Db::connect failed")?;

    // --- upload directory ----------------------------------------------------
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload dir {}", config.upload_dir.display()))?;
    info!(dir = %config.upload_dir.display(), "upload directory ready");

    // --- wiring --------------------------------------------------------------
    let games: Arc<dyn GameStore> = Arc::new(PgGameStore::new(db.clone()));
    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db.clone()));
    let accounts: Arc<dyn AccountStore> = Arc::new(PgAccountStore::new(db.clone()));

    let mut coordinator =
        IngestionCoordinator::new(games.clone(), jobs.clone(), accounts.clone());
    if let Some(base) = env_util::env_opt("CHESSCOM_API_BASE") {
        coordinator = coordinator.with_chesscom_base(base);
    }
    if let Some(base) = env_util::env_opt("LICHESS_API_BASE") {
        coordinator = coordinator.with_lichess_base(base);
    }

    let mut account_service = AccountService::new(accounts, games, jobs);
    if let Some(base) = env_util::env_opt("CHESSCOM_API_BASE") {
        account_service = account_service.with_validation_base(base);
    }
    if env_util::env_flag("SKIP_USERNAME_VALIDATION", false) {
        account_service = account_service.without_validation();
    }

    // Running imports are marked FAILED ("Request interrupted") on ctrl-c so
    // pollers are not left staring at a forever-PROCESSING job.
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("shutdown signal received, interrupting running imports");
                coordinator.trigger_shutdown();
            }
        });
    }

    let state = AppState {
        db,
        coordinator,
        accounts: account_service,
        upload_dir: config.upload_dir.clone(),
    };

    ApiServer::new(&config).run(state).await
}
