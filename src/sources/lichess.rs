//! Lichess export source: one long-lived streaming request returning the
//! user's games as PGN text, parsed as the bytes arrive. Incremental sync
//! rides the provider's own time model via the `since` epoch-ms parameter.

use std::pin::Pin;

use chrono::NaiveDateTime;
use tokio::io::AsyncBufRead;

use crate::fetch::{FetchError, ProviderProfile, RateLimitedFetcher};
use crate::pgn::PgnGameStream;

const API_BASE: &str = "https://lichess.org/api/games/user";

pub struct LichessSource {
    fetcher: RateLimitedFetcher,
    base_url: String,
    username: String,
}

impl LichessSource {
    /// `base_url` overrides the public API root (staging, local stub).
    pub fn new(username: &str, base_url: Option<&str>) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: RateLimitedFetcher::new(ProviderProfile::lichess())?,
            base_url: base_url.unwrap_or(API_BASE).trim_end_matches('/').to_string(),
            username: username.to_string(),
        })
    }

    /// Opens the export stream; the caller pulls parsed games until None.
    pub async fn open_stream(
        &mut self,
        last_sync_at: Option<NaiveDateTime>,
    ) -> Result<PgnGameStream<Pin<Box<dyn AsyncBufRead + Send>>>, FetchError> {
        let url = export_url_from(&self.base_url, &self.username, last_sync_at);
        let reader = self.fetcher.fetch_stream(&url).await?;
        Ok(PgnGameStream::new(reader, &self.username))
    }
}

/// Builds the export URL against the public API.
pub fn export_url(username: &str, last_sync_at: Option<NaiveDateTime>) -> String {
    export_url_from(API_BASE, username, last_sync_at)
}

/// `since` is the last sync instant in epoch milliseconds UTC, so a resync
/// only streams games the provider considers newer.
fn export_url_from(base: &str, username: &str, last_sync_at: Option<NaiveDateTime>) -> String {
    let mut url = format!(
        "{base}/{}?moves=true&tags=true&clocks=false&evals=false&opening=true",
        username.to_lowercase()
    );
    if let Some(sync_time) = last_sync_at {
        let since_ms = sync_time.and_utc().timestamp_millis();
        url.push_str(&format!("&since={since_ms}"));
    }
    url
}
