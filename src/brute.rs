//! Brute-force key search: trial of an ordered candidate list against one
//! block and key type.
//!
//! The search is the only long-running operation in the crate. It checks
//! for cancellation between candidates, reports progress through a
//! progress bar instead of per-candidate log lines, and suppresses info
//! logging for its duration, restoring the previous level on every exit
//! path.

use crate::card::{Key, KeyType, MifareClassic, BLOCK_COUNT};
use crate::error::{AccessError, Result};
use crate::transport::CardTransport;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, LevelFilter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Widely deployed factory and vendor default keys, tried in this order.
pub const COMMON_KEYS: [Key; 8] = [
    Key::new([0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
    Key::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]),
    Key::new([0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5]),
    Key::new([0x4D, 0x3A, 0x99, 0xC3, 0x51, 0xDD]),
    Key::new([0x1A, 0x98, 0x2C, 0x7E, 0x45, 0x9A]),
    Key::new([0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7]),
    Key::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
    Key::new([0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
];

/// Cooperative cancellation flag, checked between candidates.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the search stop before its next candidate.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl From<Arc<AtomicBool>> for CancelToken {
    /// Wrap an externally owned flag, letting a signal handler request
    /// cancellation by storing `true` into it.
    fn from(flag: Arc<AtomicBool>) -> Self {
        CancelToken(flag)
    }
}

/// How a key search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A candidate authenticated successfully
    Found(Key),
    /// Every candidate was tried and rejected
    Exhausted,
    /// The search was cancelled before exhausting the list; no key found
    Interrupted,
}

/// Load candidate keys from a file, one hex key per line.
///
/// Lines that are not valid 6-byte hex keys are skipped with a diagnostic;
/// list order is preserved.
pub fn load_key_file(path: &Path) -> Result<Vec<Key>> {
    let file = File::open(path)?;
    let mut keys = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let candidate = line.trim();
        if candidate.is_empty() {
            continue;
        }
        match Key::from_hex(candidate) {
            Ok(key) => keys.push(key),
            Err(e) => debug!("skipping key list line {}: {}", lineno + 1, e),
        }
    }
    Ok(keys)
}

/// Clamps the log level to errors only, restoring the previous level when
/// dropped, however the scope exits.
struct QuietGuard {
    previous: LevelFilter,
}

impl QuietGuard {
    fn engage() -> Self {
        let previous = log::max_level();
        log::set_max_level(LevelFilter::Error);
        QuietGuard { previous }
    }
}

impl Drop for QuietGuard {
    fn drop(&mut self) {
        log::set_max_level(self.previous);
    }
}

/// Try `candidates` against `block` with `key_type`, in list order, until
/// one authenticates or the list is exhausted.
///
/// First match wins; later candidates are not attempted. A single
/// candidate's failure never aborts the search. An empty list returns
/// `Exhausted` without touching the card.
pub fn search<T: CardTransport>(
    card: &MifareClassic<T>,
    candidates: &[Key],
    block: u8,
    key_type: KeyType,
    cancel: &CancelToken,
) -> Result<SearchOutcome> {
    if block >= BLOCK_COUNT {
        return Err(AccessError::InvalidBlock { block });
    }
    info!(
        "trying {} candidate keys against block {} (type {})",
        candidates.len(),
        block,
        key_type
    );

    let _quiet = QuietGuard::engage();
    let bar = ProgressBar::new(candidates.len() as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    bar.set_message(format!("block {block} type {key_type}"));

    for key in candidates {
        if cancel.is_cancelled() {
            bar.abandon_with_message("interrupted");
            return Ok(SearchOutcome::Interrupted);
        }
        match card.authenticate(block, Some(*key), Some(key_type)) {
            Ok(true) => {
                bar.finish_with_message("key found");
                return Ok(SearchOutcome::Found(*key));
            }
            Ok(false) => debug!("key {key} rejected for block {block}"),
            Err(e) => debug!("candidate {key} failed: {e}"),
        }
        bar.inc(1);
    }

    bar.finish_with_message("exhausted");
    Ok(SearchOutcome::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn common_keys_start_with_factory_default() {
        assert_eq!(COMMON_KEYS.len(), 8);
        assert_eq!(COMMON_KEYS[0], Key::DEFAULT);
    }

    #[test]
    fn cancel_token_latches() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_token_wraps_external_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let token = CancelToken::from(Arc::clone(&flag));
        assert!(!token.is_cancelled());
        // A signal handler only has the flag, not the token
        flag.store(true, Ordering::SeqCst);
        assert!(token.is_cancelled());
    }

    #[test]
    fn key_file_skips_malformed_lines() {
        let path = std::env::temp_dir().join(format!(
            "crid-keys-{}-{:?}.lst",
            std::process::id(),
            std::thread::current().id()
        ));
        {
            let mut file = fs::File::create(&path).unwrap();
            writeln!(file, "ffffffffffff").unwrap();
            writeln!(file, "not a key").unwrap();
            writeln!(file, "a0a1a2").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "  a0a1a2a3a4a5  ").unwrap();
        }
        let keys = load_key_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], Key::DEFAULT);
        assert_eq!(keys[1], Key::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]));
    }

    #[test]
    fn missing_key_file_is_an_io_error() {
        let result = load_key_file(Path::new("/nonexistent/keys.lst"));
        assert!(matches!(result, Err(AccessError::Io(_))));
    }
}
