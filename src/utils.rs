//! Utility functions for text cleanup, logging and file system checks.
//!
//! This module provides helper functions used throughout the crate:
//! - Whitespace normalization for extracted article text
//! - String truncation for logging
//! - Link matching against legacy URL schemes
//! - File system validation for the store directory

use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Collapse every run of whitespace (including non-breaking spaces) into a
/// single space and trim both ends.
///
/// # Examples
///
/// ```
/// use news_archiver::utils::normalize_whitespace;
/// assert_eq!(normalize_whitespace("  Erster\n\t Absatz "), "Erster Absatz");
/// ```
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (never splitting a
/// character) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```
/// use news_archiver::utils::truncate_for_log;
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Whether `link` matches an optional pattern; no pattern matches everything.
pub fn link_matches(pattern: Option<&Regex>, link: &str) -> bool {
    pattern.is_none_or(|re| re.is_match(link))
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a check file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await?;
    let check_path = path.join(".__write_check__");
    fs::write(&check_path, b"").await?;
    let _ = fs::remove_file(&check_path).await;
    info!("Store directory is writable");
    Ok(())
}
