//! Streaming PGN tokenizer.
//!
//! A PGN game is a block of `[Tag "value"]` header lines, an optional blank
//! line, then move text terminated by a result token. Games are usually
//! separated by blank lines, but some providers omit the separator, so a `[`
//! line seen inside a move section starts the next game.

pub mod normalize;

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

pub use normalize::ParsedGame;

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\[([A-Za-z]+)\s+"([^"]*)"\]$"#).unwrap());

/// Counts games in a PGN file by `[Event ` tags without materializing them.
/// Used for upload progress totals only; streaming sources never know their
/// total up front.
pub async fn count_games(path: &Path) -> Result<u64> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut count = 0u64;
    while let Some(line) = lines.next_line().await? {
        if line.starts_with("[Event ") {
            count += 1;
        }
    }
    Ok(count)
}

/// Parses a single pre-delimited PGN string (Chess.com archives deliver each
/// game as its own string). Returns None when the game does not involve
/// `username` or cannot be assembled.
pub fn parse_one(pgn: &str, username: &str) -> Option<ParsedGame> {
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut moves = String::new();

    for line in pgn.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            if let Some(caps) = HEADER_RE.captures(line) {
                headers.insert(caps[1].to_string(), caps[2].to_string());
            }
        } else {
            moves.push_str(line);
            moves.push(' ');
        }
    }

    normalize::build_game(&headers, &moves, username)
}

/// Pull-based streaming parser over any buffered byte source (an uploaded
/// file or a long-lived HTTP body). Yields one `ParsedGame` at a time;
/// malformed or foreign games are skipped without ending the stream.
pub struct PgnGameStream<R> {
    lines: Lines<R>,
    username: String,
    headers: HashMap<String, String>,
    moves: String,
    in_moves: bool,
    // A `[` line that terminated the previous game and must be re-consumed
    // as the first header of the next one.
    pushed_back: Option<String>,
    eof: bool,
}

impl<R: AsyncBufRead + Unpin> PgnGameStream<R> {
    pub fn new(reader: R, username: &str) -> Self {
        Self {
            lines: reader.lines(),
            username: username.to_string(),
            headers: HashMap::new(),
            moves: String::new(),
            in_moves: false,
            pushed_back: None,
            eof: false,
        }
    }

    /// Next well-formed game involving the configured username, or None at
    /// end of stream. IO errors propagate and end the stream.
    pub async fn next_game(&mut self) -> Result<Option<ParsedGame>> {
        if self.eof {
            return Ok(None);
        }

        loop {
            let line = match self.pushed_back.take() {
                Some(line) => Some(line),
                None => self.lines.next_line().await?,
            };

            let Some(raw) = line else {
                self.eof = true;
                // Trailing game without a final blank line.
                if !self.headers.is_empty() {
                    if let Some(game) = self.take_game() {
                        return Ok(Some(game));
                    }
                }
                return Ok(None);
            };

            let line = raw.trim();

            if line.is_empty() {
                // A blank line ends the move section; between headers and
                // moves it is just the optional separator.
                if !self.headers.is_empty() && self.in_moves {
                    if let Some(game) = self.take_game() {
                        return Ok(Some(game));
                    }
                }
                continue;
            }

            if line.starts_with('[') {
                if self.in_moves && !self.headers.is_empty() {
                    // Next game starts without a separating blank line.
                    self.pushed_back = Some(raw.clone());
                    if let Some(game) = self.take_game() {
                        return Ok(Some(game));
                    }
                    continue;
                }
                if let Some(caps) = HEADER_RE.captures(line) {
                    self.headers.insert(caps[1].to_string(), caps[2].to_string());
                }
                continue;
            }

            self.in_moves = true;
            self.moves.push_str(line);
            self.moves.push(' ');
        }
    }

    /// Assemble and reset. None when the buffered game is malformed or does
    /// not involve the username (such games are dropped silently).
    fn take_game(&mut self) -> Option<ParsedGame> {
        let game = normalize::build_game(&self.headers, &self.moves, &self.username);
        if game.is_none() {
            debug!(
                white = self.headers.get("White").map(String::as_str),
                black = self.headers.get("Black").map(String::as_str),
                "skipping game not involving account username"
            );
        }
        self.headers.clear();
        self.moves.clear();
        self.in_moves = false;
        game
    }
}
