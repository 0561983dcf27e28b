//! Account management: CRUD, Chess.com username validation on creation,
//! and cascading deletion of an account's jobs and games.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{Account, Platform};
use crate::store::{AccountStore, GameStore, JobStore};

const CHESS_COM_PLAYER_API: &str = "https://api.chess.com/pub/player";
const USER_AGENT: &str = "chess-analytics/0.1 (personal project; game sync)";
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Synchronous account-operation failures, mapped to HTTP statuses by the
/// API layer.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account '{username}' on {platform} already exists")]
    Duplicate {
        username: String,
        platform: &'static str,
        existing_id: i64,
    },
    /// The username failed provider validation.
    #[error("{0}")]
    Validation(String),
    /// The provider could not be reached to validate.
    #[error("{0}")]
    ExternalApi(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    games: Arc<dyn GameStore>,
    jobs: Arc<dyn JobStore>,
    validation_base: Option<String>,
    skip_validation: bool,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        games: Arc<dyn GameStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            accounts,
            games,
            jobs,
            validation_base: None,
            skip_validation: false,
        }
    }

    /// Point username validation at a non-default endpoint.
    pub fn with_validation_base(mut self, base_url: impl Into<String>) -> Self {
        self.validation_base = Some(base_url.into());
        self
    }

    /// Disable outbound username validation entirely (offline deployments).
    pub fn without_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    /// Create an account after a duplicate check and, for Chess.com,
    /// after validating the username against the public API.
    pub async fn create(
        &self,
        platform: Platform,
        username: &str,
        label: Option<&str>,
    ) -> Result<(Account, i64), AccountError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AccountError::Validation("Username cannot be empty".into()));
        }

        if let Some(existing) = self
            .accounts
            .find_by_platform_username(platform, username)
            .await?
        {
            return Err(AccountError::Duplicate {
                username: username.to_string(),
                platform: platform.display_name(),
                existing_id: existing.id,
            });
        }

        if platform == Platform::ChessCom && !self.skip_validation {
            self.validate_chesscom_username(username).await?;
        }

        let account = self.accounts.insert(platform, username, label).await?;
        info!(
            account_id = account.id,
            username = %account.username,
            platform = ?account.platform,
            "created account"
        );
        Ok((account, 0))
    }

    pub async fn get(&self, id: i64) -> Result<Option<(Account, i64)>> {
        let Some(account) = self.accounts.get(id).await? else {
            return Ok(None);
        };
        let count = self.games.count_by_account(id).await?;
        Ok(Some((account, count)))
    }

    pub async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        self.accounts.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<(Account, i64)>> {
        let mut out = Vec::new();
        for account in self.accounts.list().await? {
            let count = self.games.count_by_account(account.id).await?;
            out.push((account, count));
        }
        Ok(out)
    }

    pub async fn update_label(
        &self,
        id: i64,
        label: Option<&str>,
    ) -> Result<Option<(Account, i64)>> {
        let Some(account) = self.accounts.update_label(id, label).await? else {
            return Ok(None);
        };
        info!(account_id = id, label = ?account.label, "updated account label");
        let count = self.games.count_by_account(id).await?;
        Ok(Some((account, count)))
    }

    /// Delete an account with all of its jobs and games. Jobs go first to
    /// satisfy the foreign keys.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        if self.accounts.get(id).await?.is_none() {
            return Ok(false);
        }
        let jobs_deleted = self.jobs.delete_by_account(id).await?;
        let games_deleted = self.games.delete_by_account(id).await?;
        self.accounts.delete(id).await?;
        info!(
            account_id = id,
            jobs_deleted, games_deleted, "deleted account and associated data"
        );
        Ok(true)
    }

    /// Single GET against the player endpoint; deliberately no retries so
    /// account creation stays interactive.
    async fn validate_chesscom_username(&self, username: &str) -> Result<(), AccountError> {
        let base = self
            .validation_base
            .as_deref()
            .unwrap_or(CHESS_COM_PLAYER_API)
            .trim_end_matches('/');
        let url = format!("{base}/{}", username.to_lowercase());
        debug!(username, "validating Chess.com username");

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(VALIDATION_TIMEOUT)
            .build()
            .map_err(|err| AccountError::Internal(err.into()))?;

        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Chess.com validation request failed");
                return Err(AccountError::ExternalApi(
                    "Unable to connect to Chess.com. Please try again.".into(),
                ));
            }
        };

        match response.status().as_u16() {
            200 => Ok(()),
            404 => Err(AccountError::Validation(format!(
                "Username '{username}' not found on Chess.com"
            ))),
            429 => Err(AccountError::ExternalApi(
                "Chess.com is temporarily unavailable. Please try again in a moment.".into(),
            )),
            status => {
                warn!(status, "unexpected Chess.com validation response");
                Err(AccountError::ExternalApi(
                    "Unable to verify username. Please try again.".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryAccountStore, MemoryGameStore, MemoryJobStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct Harness {
        service: AccountService,
        accounts: Arc<MemoryAccountStore>,
        games: Arc<MemoryGameStore>,
        jobs: Arc<MemoryJobStore>,
    }

    fn harness() -> Harness {
        let accounts = Arc::new(MemoryAccountStore::new());
        let games = Arc::new(MemoryGameStore::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let service = AccountService::new(
            accounts.clone() as Arc<dyn AccountStore>,
            games.clone() as Arc<dyn GameStore>,
            jobs.clone() as Arc<dyn JobStore>,
        );
        Harness {
            service,
            accounts,
            games,
            jobs,
        }
    }

    async fn spawn_status_stub(status: u16) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let read = socket.read(&mut chunk).await.unwrap_or(0);
                    if read == 0 {
                        break;
                    }
                    head.extend_from_slice(&chunk[..read]);
                    if head.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn creates_lichess_account_without_validation() {
        let h = harness();
        let (account, games_count) = h
            .service
            .create(Platform::Lichess, "someone", Some("main"))
            .await
            .unwrap();
        assert_eq!(account.username, "someone");
        assert_eq!(account.label.as_deref(), Some("main"));
        assert_eq!(games_count, 0);
    }

    #[tokio::test]
    async fn rejects_blank_username() {
        let h = harness();
        let err = h
            .service
            .create(Platform::Lichess, "   ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_duplicate_ignoring_case() {
        let h = harness();
        h.service
            .create(Platform::Lichess, "Player", None)
            .await
            .unwrap();
        let err = h
            .service
            .create(Platform::Lichess, "player", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn same_username_on_another_platform_is_allowed() {
        let h = harness();
        h.service
            .create(Platform::Lichess, "player", None)
            .await
            .unwrap();
        let result = h
            .service
            .without_validation()
            .create(Platform::ChessCom, "player", None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn chesscom_creation_validates_username() {
        let h = harness();
        let base = spawn_status_stub(200).await;
        let service = h.service.with_validation_base(base);
        assert!(service
            .create(Platform::ChessCom, "realuser", None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_chesscom_username_is_a_validation_error() {
        let h = harness();
        let base = spawn_status_stub(404).await;
        let service = h.service.with_validation_base(base);
        let err = service
            .create(Platform::ChessCom, "nouser", None)
            .await
            .unwrap_err();
        match err {
            AccountError::Validation(message) => {
                assert!(message.contains("not found on Chess.com"))
            }
            other => panic!("expected Validation, got {other:?}"),
        }
        assert!(h.accounts.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_validation_is_an_external_api_error() {
        let h = harness();
        let base = spawn_status_stub(429).await;
        let service = h.service.with_validation_base(base);
        let err = service
            .create(Platform::ChessCom, "user", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::ExternalApi(_)));
    }

    #[tokio::test]
    async fn delete_cascades_jobs_and_games() {
        let h = harness();
        let account = h.accounts.seed(Platform::Lichess, "player");
        h.jobs.create(account.id, None).await.unwrap();
        h.games
            .insert(&crate::model::NewGame {
                account_id: account.id,
                played_at: chrono::Utc::now().naive_utc(),
                result: crate::model::GameResult::Win,
                color: crate::model::Color::White,
                time_control_raw: None,
                time_control_category: crate::model::TimeControlCategory::Unknown,
                eco_code: None,
                opening_name: None,
                opponent: None,
                pgn_hash: "a".repeat(64),
            })
            .await
            .unwrap();

        assert!(h.service.delete(account.id).await.unwrap());
        assert!(h.accounts.get(account.id).await.unwrap().is_none());
        assert!(h.jobs.list_by_account(account.id).await.unwrap().is_empty());
        assert_eq!(h.games.count_by_account(account.id).await.unwrap(), 0);

        // Second delete reports missing.
        assert!(!h.service.delete(account.id).await.unwrap());
    }
}
