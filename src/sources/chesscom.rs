//! Chess.com published-data source: monthly archive discovery, incremental
//! year-month filtering against the account's last sync, and per-archive
//! game fetches. Each archive is a JSON document whose `games` array carries
//! one complete PGN string per game.

use chrono::{Datelike, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::fetch::{FetchError, ProviderProfile, RateLimitedFetcher};
use crate::pgn::{self, ParsedGame};

const API_BASE: &str = "https://api.chess.com/pub/player";

static ARCHIVE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/games/(\d{4})/(\d{2})$").unwrap());

pub struct ChessComSource {
    fetcher: RateLimitedFetcher,
    base_url: String,
    username: String,
}

impl ChessComSource {
    /// `base_url` overrides the public API root (staging, local stub).
    pub fn new(username: &str, base_url: Option<&str>) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: RateLimitedFetcher::new(ProviderProfile::chess_com())?,
            base_url: base_url.unwrap_or(API_BASE).trim_end_matches('/').to_string(),
            username: username.to_string(),
        })
    }

    pub fn archives_url(&self) -> String {
        format!(
            "{}/{}/games/archives",
            self.base_url,
            self.username.to_lowercase()
        )
    }

    /// Monthly archive URLs, oldest first (list order from the provider).
    pub async fn fetch_archive_list(&mut self) -> Result<Vec<String>, FetchError> {
        let url = self.archives_url();
        let body = self.fetcher.fetch_json(&url).await?;
        Ok(parse_archive_list(&body))
    }

    /// PGN strings for one monthly archive.
    pub async fn fetch_archive_games(&mut self, archive_url: &str) -> Result<Vec<String>, FetchError> {
        let body = self.fetcher.fetch_json(archive_url).await?;
        Ok(parse_archive_games(&body))
    }

    pub fn parse_game(&self, pgn_text: &str) -> Option<ParsedGame> {
        pgn::parse_one(pgn_text, &self.username)
    }
}

fn parse_archive_list(body: &Value) -> Vec<String> {
    body.get("archives")
        .and_then(Value::as_array)
        .map(|archives| {
            archives
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_archive_games(body: &Value) -> Vec<String> {
    body.get("games")
        .and_then(Value::as_array)
        .map(|games| {
            games
                .iter()
                .filter_map(|game| game.get("pgn").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Drops archives strictly before the year-month of the last successful
/// sync. URLs that don't look like `.../games/YYYY/MM` are kept, so an
/// unexpected provider format falls back to a full sync of that entry.
pub fn filter_archives_since(
    archives: Vec<String>,
    last_sync_at: Option<NaiveDateTime>,
) -> Vec<String> {
    let Some(last_sync) = last_sync_at else {
        return archives;
    };
    let since = (last_sync.year(), last_sync.month());

    archives
        .into_iter()
        .filter(|url| match archive_year_month(url) {
            Some(month) => month >= since,
            None => true,
        })
        .collect()
}

fn archive_year_month(url: &str) -> Option<(i32, u32)> {
    let caps = ARCHIVE_URL_RE.captures(url)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    Some((year, month))
}
