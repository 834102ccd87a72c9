//! Structured reply parsing.
//!
//! The secretary is instructed to answer in a fixed 4-section format:
//! `<think>` (internal reasoning, hidden from clients), `<summary>`,
//! `<insight>`, `<suggestion>`. Parsing is tolerant: missing sections
//! are empty, and when none of the visible sections parse the whole
//! text becomes the summary so the user never sees a blank reply.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").unwrap());
static SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<summary>(.*?)</summary>").unwrap());
static INSIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<insight>(.*?)</insight>").unwrap());
static SUGGESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<suggestion>(.*?)</suggestion>").unwrap());

/// Parsed sections of one reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplySections {
    /// Internal reasoning; never forwarded to channel clients.
    pub thinking: String,
    pub summary: String,
    pub insight: String,
    pub suggestion: String,
    pub has_thinking: bool,
}

impl ReplySections {
    /// Extract sections from raw model output.
    pub fn parse(text: &str) -> Self {
        let section = |re: &Regex| {
            re.captures(text)
                .map(|cap| cap[1].trim().to_string())
                .unwrap_or_default()
        };

        let thinking = section(&THINK);
        let mut summary = section(&SUMMARY);
        let insight = section(&INSIGHT);
        let suggestion = section(&SUGGESTION);

        // Unformatted output: surface the whole text rather than
        // nothing.
        if summary.is_empty() && insight.is_empty() && suggestion.is_empty() {
            summary = text.trim().to_string();
        }

        Self {
            has_thinking: !thinking.is_empty(),
            thinking,
            summary,
            insight,
            suggestion,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
