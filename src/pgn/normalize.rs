//! Turns raw PGN headers + move text into a normalized game record:
//! player color, result from the player's perspective, UTC timestamp,
//! time-control category and the deduplication fingerprint.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::model::{Color, GameResult, NewGame, TimeControlCategory};

const DATE_FORMAT: &str = "%Y.%m.%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Hash input uses at most this many bytes of collapsed move text; enough to
/// be unique without hashing whole games.
const FINGERPRINT_MOVE_BYTES: usize = 200;

/// Intermediate representation of one parsed game, before it is attached to
/// an account and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGame {
    pub played_at: NaiveDateTime,
    pub result: GameResult,
    pub color: Color,
    pub time_control_raw: Option<String>,
    pub time_control_category: TimeControlCategory,
    pub eco_code: Option<String>,
    pub opening_name: Option<String>,
    pub opponent: Option<String>,
    pub pgn_hash: String,
}

impl ParsedGame {
    pub fn into_new_game(self, account_id: i64) -> NewGame {
        NewGame {
            account_id,
            played_at: self.played_at,
            result: self.result,
            color: self.color,
            time_control_raw: self.time_control_raw,
            time_control_category: self.time_control_category,
            eco_code: self.eco_code,
            opening_name: self.opening_name,
            opponent: self.opponent,
            pgn_hash: self.pgn_hash,
        }
    }
}

/// Builds a `ParsedGame` from headers and move text, or None when the game
/// does not involve `username` as White or Black (case-insensitive).
pub fn build_game(
    headers: &HashMap<String, String>,
    moves: &str,
    username: &str,
) -> Option<ParsedGame> {
    let white = headers.get("White").map(String::as_str);
    let black = headers.get("Black").map(String::as_str);

    let (color, opponent) = if white.is_some_and(|w| w.eq_ignore_ascii_case(username)) {
        (Color::White, black)
    } else if black.is_some_and(|b| b.eq_ignore_ascii_case(username)) {
        (Color::Black, white)
    } else {
        return None;
    };

    let result = parse_result(headers.get("Result").map(String::as_str), color);
    let played_at = parse_played_at(headers);

    let time_control_raw = headers.get("TimeControl").cloned();
    let time_control_category = categorize_time_control(time_control_raw.as_deref());

    Some(ParsedGame {
        played_at,
        result,
        color,
        time_control_raw,
        time_control_category,
        eco_code: headers.get("ECO").cloned(),
        opening_name: headers.get("Opening").cloned(),
        opponent: opponent.map(str::to_string),
        pgn_hash: fingerprint(headers, moves),
    })
}

/// Result token mapped to the player's perspective; `*` and anything
/// unrecognized fall back to a draw.
fn parse_result(result: Option<&str>, color: Color) -> GameResult {
    match result {
        Some("1-0") => {
            if color == Color::White {
                GameResult::Win
            } else {
                GameResult::Loss
            }
        }
        Some("0-1") => {
            if color == Color::Black {
                GameResult::Win
            } else {
                GameResult::Loss
            }
        }
        _ => GameResult::Draw,
    }
}

/// `Date` (yyyy.MM.dd) plus `UTCTime` or `Time` (HH:mm:ss), read as naive
/// UTC. Unknown dates (missing or containing `?`) substitute today; a
/// missing or unparseable time means midnight.
fn parse_played_at(headers: &HashMap<String, String>) -> NaiveDateTime {
    let date = headers
        .get("Date")
        .filter(|raw| !raw.contains('?'))
        .and_then(|raw| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map_err(|_| debug!(date = %raw, "failed to parse Date header"))
                .ok()
        })
        .unwrap_or_else(|| Utc::now().date_naive());

    let time = headers
        .get("UTCTime")
        .or_else(|| headers.get("Time"))
        .and_then(|raw| {
            NaiveTime::parse_from_str(raw, TIME_FORMAT)
                .map_err(|_| debug!(time = %raw, "failed to parse time header"))
                .ok()
        })
        .unwrap_or(NaiveTime::MIN);

    NaiveDateTime::new(date, time)
}

/// Buckets a raw `TimeControl` header by base seconds. `base+increment`
/// counts only the base; `moves/seconds` forms are correspondence.
pub fn categorize_time_control(raw: Option<&str>) -> TimeControlCategory {
    let Some(raw) = raw else {
        return TimeControlCategory::Unknown;
    };
    if raw == "-" {
        return TimeControlCategory::Unknown;
    }
    if raw.contains('/') {
        return TimeControlCategory::Correspondence;
    }

    let base = raw.split(['+', '/']).next().unwrap_or("");
    match base.parse::<i64>() {
        Ok(seconds) if seconds < 30 => TimeControlCategory::Ultrabullet,
        Ok(seconds) if seconds < 180 => TimeControlCategory::Bullet,
        Ok(seconds) if seconds < 600 => TimeControlCategory::Blitz,
        Ok(seconds) if seconds < 1800 => TimeControlCategory::Rapid,
        Ok(_) => TimeControlCategory::Classical,
        Err(_) => TimeControlCategory::Unknown,
    }
}

/// SHA-256 over date + players + result + a collapsed move prefix, as
/// lowercase hex. Identical bytes always fingerprint identically, which is
/// what makes retried imports idempotent.
fn fingerprint(headers: &HashMap<String, String>, moves: &str) -> String {
    let header = |name: &str| headers.get(name).map(String::as_str).unwrap_or("");

    let collapsed = moves.split_whitespace().collect::<Vec<_>>().join(" ");
    let prefix = truncate_bytes(&collapsed, FINGERPRINT_MOVE_BYTES);

    let mut hasher = Sha256::new();
    hasher.update(header("Date").as_bytes());
    hasher.update(header("White").as_bytes());
    hasher.update(header("Black").as_bytes());
    hasher.update(header("Result").as_bytes());
    hasher.update(prefix.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn categorizes_time_controls() {
        let cases = [
            (Some("15"), TimeControlCategory::Ultrabullet),
            (Some("60"), TimeControlCategory::Bullet),
            (Some("180"), TimeControlCategory::Blitz),
            (Some("180+2"), TimeControlCategory::Blitz),
            (Some("600"), TimeControlCategory::Rapid),
            (Some("1800"), TimeControlCategory::Classical),
            (Some("1/86400"), TimeControlCategory::Correspondence),
            (Some("-"), TimeControlCategory::Unknown),
            (None, TimeControlCategory::Unknown),
            (Some("garbage"), TimeControlCategory::Unknown),
        ];
        for (raw, expected) in cases {
            assert_eq!(categorize_time_control(raw), expected, "raw = {raw:?}");
        }
    }

    #[test]
    fn maps_loss_for_white_on_black_win() {
        let h = headers(&[("White", "me"), ("Black", "you"), ("Result", "0-1")]);
        let game = build_game(&h, "1. e4 e5", "me").unwrap();
        assert_eq!(game.color, Color::White);
        assert_eq!(game.result, GameResult::Loss);
        assert_eq!(game.opponent.as_deref(), Some("you"));
    }

    #[test]
    fn unterminated_result_is_a_draw() {
        let h = headers(&[("White", "me"), ("Black", "you"), ("Result", "*")]);
        let game = build_game(&h, "1. e4", "me").unwrap();
        assert_eq!(game.result, GameResult::Draw);
    }

    #[test]
    fn color_match_ignores_case() {
        let h = headers(&[("White", "Alice"), ("Black", "Bob"), ("Result", "1-0")]);
        let game = build_game(&h, "1. e4", "alice").unwrap();
        assert_eq!(game.color, Color::White);
        assert_eq!(game.opponent.as_deref(), Some("Bob"));
    }

    #[test]
    fn returns_none_for_unrelated_username() {
        let h = headers(&[("White", "a"), ("Black", "b"), ("Result", "1-0")]);
        assert!(build_game(&h, "1. e4", "carol").is_none());
    }

    #[test]
    fn combines_date_with_utc_time() {
        let h = headers(&[
            ("White", "me"),
            ("Black", "you"),
            ("Result", "1-0"),
            ("Date", "2024.06.15"),
            ("UTCTime", "13:45:09"),
        ]);
        let game = build_game(&h, "1. e4", "me").unwrap();
        assert_eq!(game.played_at.date().year(), 2024);
        assert_eq!(game.played_at.date().month(), 6);
        assert_eq!(game.played_at.date().day(), 15);
        assert_eq!(game.played_at.time().hour(), 13);
        assert_eq!(game.played_at.time().minute(), 45);
    }

    #[test]
    fn unknown_date_falls_back_to_today_at_midnight() {
        let h = headers(&[
            ("White", "me"),
            ("Black", "you"),
            ("Result", "1-0"),
            ("Date", "????.??.??"),
        ]);
        let game = build_game(&h, "1. e4", "me").unwrap();
        assert_eq!(game.played_at.date(), Utc::now().date_naive());
        assert_eq!(game.played_at.time(), NaiveTime::MIN);
    }

    #[test]
    fn fingerprint_is_deterministic_and_hex() {
        let h = headers(&[
            ("White", "me"),
            ("Black", "you"),
            ("Result", "1-0"),
            ("Date", "2024.01.01"),
        ]);
        let a = build_game(&h, "1. e4  e5\n2. Nf3 Nc6", "me").unwrap();
        let b = build_game(&h, "1. e4  e5\n2. Nf3 Nc6", "me").unwrap();
        assert_eq!(a.pgn_hash, b.pgn_hash);
        assert_eq!(a.pgn_hash.len(), 64);
        assert!(a.pgn_hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(a.pgn_hash.chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_collapses_whitespace_runs() {
        let h = headers(&[("White", "me"), ("Black", "you"), ("Result", "1-0")]);
        let a = build_game(&h, "1. e4   e5 \n 2. Nf3", "me").unwrap();
        let b = build_game(&h, "1. e4 e5 2. Nf3", "me").unwrap();
        assert_eq!(a.pgn_hash, b.pgn_hash);
    }

    #[test]
    fn fingerprint_ignores_moves_past_the_prefix() {
        let h = headers(&[("White", "me"), ("Black", "you"), ("Result", "1-0")]);
        let long_a = format!("{} tail-one", "x".repeat(400));
        let long_b = format!("{} tail-two", "x".repeat(400));
        let a = build_game(&h, &long_a, "me").unwrap();
        let b = build_game(&h, &long_b, "me").unwrap();
        assert_eq!(a.pgn_hash, b.pgn_hash);
    }

    #[test]
    fn fingerprint_differs_across_dates() {
        let h1 = headers(&[
            ("White", "me"),
            ("Black", "you"),
            ("Result", "1-0"),
            ("Date", "2024.01.01"),
        ]);
        let h2 = headers(&[
            ("White", "me"),
            ("Black", "you"),
            ("Result", "1-0"),
            ("Date", "2024.01.02"),
        ]);
        let a = build_game(&h1, "1. e4", "me").unwrap();
        let b = build_game(&h2, "1. e4", "me").unwrap();
        assert_ne!(a.pgn_hash, b.pgn_hash);
    }
}
