//! Parsing of rsync's textual output.

use crate::utils::errors::{BackupError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static TOTAL_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"total size is ([0-9][0-9,]*)").expect("valid regex"));

const EXCERPT_LEN: usize = 200;

/// Extract the byte count from the `total size is <n>` line of a transfer report
pub fn parse_total_size(report: &str) -> Result<u64> {
    let captures = TOTAL_SIZE
        .captures(report)
        .ok_or_else(|| BackupError::Parse(format!("no \"total size is\" in report: {}", excerpt(report))))?;

    let digits: String = captures[1].chars().filter(|c| *c != ',').collect();
    digits
        .parse::<u64>()
        .map_err(|e| BackupError::Parse(format!("bad total size {:?}: {}", &captures[1], e)))
}

/// Module names from a daemon listing, in listing order.
///
/// The daemon prints one module per line, optionally followed by a tab and a
/// comment; only the name is kept.
pub fn parse_module_list(listing: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

fn excerpt(report: &str) -> String {
    let trimmed = report.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let tail: String = trimmed.chars().rev().take(EXCERPT_LEN).collect();
    tail.chars().rev().collect()
}
