//! Rate-limited HTTP fetcher shared by the provider adapters.
//!
//! Each provider gets a profile describing its published etiquette:
//! inter-request pacing, 429 back-off, retry cap and request timeout. The
//! fetcher owns one `reqwest::Client` per profile with a fixed User-Agent.

use std::pin::Pin;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::time::sleep;
use tokio_util::io::StreamReader;
use tracing::warn;

const USER_AGENT: &str = "chess-analytics/0.1 (personal project; game sync)";

/// Scheduling policy for one provider.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub name: &'static str,
    /// Applied before every request after the first in a session.
    pub inter_request_delay: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Doubling back-off when true, fixed otherwise.
    pub exponential_backoff: bool,
    pub max_retries: u32,
    pub request_timeout: Duration,
    /// Extra Accept header, for providers that negotiate a body format.
    pub accept: Option<&'static str>,
}

impl ProviderProfile {
    /// Chess.com published-data API: sequential requests, 500ms pacing,
    /// exponential 429 back-off from 2s capped at 60s.
    pub fn chess_com() -> Self {
        Self {
            name: "Chess.com",
            inter_request_delay: Duration::from_millis(500),
            initial_backoff: Duration::from_millis(2000),
            max_backoff: Duration::from_millis(60_000),
            exponential_backoff: true,
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            accept: None,
        }
    }

    /// Lichess export API: one long-lived streaming request, fixed 60s wait
    /// on 429 per their guidelines.
    pub fn lichess() -> Self {
        Self {
            name: "Lichess",
            inter_request_delay: Duration::ZERO,
            initial_backoff: Duration::from_millis(60_000),
            max_backoff: Duration::from_millis(60_000),
            exponential_backoff: false,
            max_retries: 3,
            request_timeout: Duration::from_secs(600),
            accept: Some("application/x-chess-pgn"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Resource not found: {url}")]
    NotFound { url: String },
    #[error("Rate limited by {provider} after {retries} retries")]
    RateLimited { provider: &'static str, retries: u32 },
    #[error("{provider} API error: HTTP {status}")]
    Status { provider: &'static str, status: u16 },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub struct RateLimitedFetcher {
    client: Client,
    profile: ProviderProfile,
    requests_sent: u64,
}

impl RateLimitedFetcher {
    pub fn new(profile: ProviderProfile) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(profile.request_timeout)
            .build()?;
        Ok(Self {
            client,
            profile,
            requests_sent: 0,
        })
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    /// GET with pacing and 429 back-off; returns the 200 response. 404 and
    /// other statuses map to typed errors.
    async fn get_ok(&mut self, url: &str) -> Result<Response, FetchError> {
        let mut backoff = self.profile.initial_backoff;
        let mut attempt = 0u32;

        loop {
            if self.requests_sent > 0 && !self.profile.inter_request_delay.is_zero() {
                sleep(self.profile.inter_request_delay).await;
            }

            let mut req = self.client.get(url);
            if let Some(accept) = self.profile.accept {
                req = req.header("Accept", accept);
            }
            self.requests_sent += 1;
            let resp = req.send().await?;

            match resp.status() {
                StatusCode::OK => return Ok(resp),
                StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    if attempt >= self.profile.max_retries {
                        return Err(FetchError::RateLimited {
                            provider: self.profile.name,
                            retries: self.profile.max_retries,
                        });
                    }
                    warn!(
                        provider = self.profile.name,
                        backoff_ms = backoff.as_millis() as u64,
                        attempt,
                        max_retries = self.profile.max_retries,
                        "rate limited (429), backing off"
                    );
                    sleep(backoff).await;
                    if self.profile.exponential_backoff {
                        backoff = (backoff * 2).min(self.profile.max_backoff);
                    }
                }
                StatusCode::NOT_FOUND => {
                    return Err(FetchError::NotFound {
                        url: url.to_string(),
                    })
                }
                status => {
                    return Err(FetchError::Status {
                        provider: self.profile.name,
                        status: status.as_u16(),
                    })
                }
            }
        }
    }

    pub async fn fetch_text(&mut self, url: &str) -> Result<String, FetchError> {
        Ok(self.get_ok(url).await?.text().await?)
    }

    pub async fn fetch_json(&mut self, url: &str) -> Result<serde_json::Value, FetchError> {
        Ok(self.get_ok(url).await?.json().await?)
    }

    /// Streaming body as a buffered async reader, for sources that parse as
    /// bytes arrive instead of buffering the corpus.
    pub async fn fetch_stream(
        &mut self,
        url: &str,
    ) -> Result<Pin<Box<dyn AsyncBufRead + Send>>, FetchError> {
        let resp = self.get_ok(url).await?;
        let stream = resp.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }
}
