//! Uploaded-PGN-file source. Counts games once for a usable progress total,
//! then streams the same file through the parser. The double read is
//! deliberate and applies to files only; streaming sources never know their
//! total in advance.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::BufReader;

use crate::pgn::{self, PgnGameStream};

pub async fn count(path: &Path) -> Result<u64> {
    pgn::count_games(path)
        .await
        .with_context(|| format!("counting games in {}", path.display()))
}

pub async fn open_stream(path: &Path, username: &str) -> Result<PgnGameStream<BufReader<File>>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(PgnGameStream::new(BufReader::new(file), username))
}
