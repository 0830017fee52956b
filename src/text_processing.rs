//! # Text Processing Module
//!
//! ## Purpose
//! Text normalization and analysis helpers shared by the parser and the
//! ingestion pipeline: whitespace collapsing, Unicode normalization, content
//! hashing for change detection, and sub-section marker extraction.
//!
//! ## Input/Output Specification
//! - **Input**: Raw paragraph text from statute documents
//! - **Output**: Normalized text, hex content hashes, sub-section markers
//! - **Normalization**: NFC + whitespace collapsing, paragraph breaks preserved
//!
//! ## Key Features
//! - Deterministic normalization (same input, same output)
//! - SHA-256 content hashing for re-import change detection
//! - German statute sub-section marker recognition ("(1)", "(2a)", ...)

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Regex matching a sub-section marker at the start of a paragraph.
///
/// Markers are a parenthesized number with an optional letter suffix, e.g.
/// "(1)", "(12)", "(2a)". Parenthesized words like "(weggefallen)" are not
/// markers and leave the paragraph at section granularity.
fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\((\d{1,3}[a-z]?)\)\s*").expect("valid marker regex"))
}

/// Normalize a code identifier: trimmed and lowercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Normalize body text: Unicode NFC, collapse horizontal whitespace runs,
/// trim line ends, and reduce blank-line runs to single paragraph breaks.
pub fn normalize_text(raw: &str) -> String {
    let nfc: String = raw.nfc().collect();

    let mut out = String::with_capacity(nfc.len());
    let mut pending_break = false;
    for line in nfc.lines() {
        let collapsed: Vec<&str> = line.split_whitespace().collect();
        if collapsed.is_empty() {
            pending_break = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_break { "\n\n" } else { "\n" });
        }
        pending_break = false;
        out.push_str(&collapsed.join(" "));
    }
    out
}

/// Hex SHA-256 of the normalized text, used as the unit's content hash.
pub fn content_hash(normalized_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract a sub-section marker from the start of a paragraph.
///
/// Returns the marker without parentheses ("1", "2a"), or `None` when the
/// paragraph belongs to the section-level unit.
pub fn extract_sub_section(paragraph: &str) -> Option<String> {
    marker_regex()
        .captures(paragraph)
        .map(|caps| caps[1].to_string())
}
