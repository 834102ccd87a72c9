//! Prompt-injection threat scanner.
//!
//! Classifies free text against a fixed, ordered pattern ruleset and
//! reports the worst severity seen plus evidence for every match.
//!
//! ## Design
//! - The ruleset is built once at process start and never mutated at
//!   runtime, so adversarial input cannot disable a rule.
//! - The whole text is always scanned (confidence is a function of the
//!   total match count, not just the first hit).
//! - Scanning is pure: same input, same result, no side effects.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Threat severity level, ordered from harmless to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    /// No suspicious pattern matched.
    #[default]
    Safe,
    /// Marker-forging and other low-grade probing.
    Low,
    /// Possibly-legitimate phrasing that warrants attention.
    Medium,
    /// Blocked-by-default instruction override attempts.
    High,
    /// Role hijacking, command execution, credential extraction.
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// One rule in the detection ruleset.
pub struct PatternRule {
    /// Stable identifier, used in evidence and per-rule tests.
    pub id: &'static str,
    /// Compiled case-insensitive pattern.
    pub regex: Regex,
    /// Severity assigned to any match of this rule.
    pub level: ThreatLevel,
}

/// Source table for the ruleset: `(id, pattern, level)`.
///
/// Kept as plain data (rather than inline literals in control flow) so
/// every rule can be exercised independently in tests.
const RULE_TABLE: &[(&str, &str, ThreatLevel)] = &[
    // Direct instruction overrides
    (
        "ignore_previous",
        r"ignore\s+(all\s+)?(previous|prior|above)\s+(instructions?|prompts?)",
        ThreatLevel::High,
    ),
    (
        "disregard_previous",
        r"disregard\s+(all\s+)?(previous|prior|above)",
        ThreatLevel::High,
    ),
    (
        "forget_rules",
        r"forget\s+(everything|all|your)\s+(instructions?|rules?|guidelines?)",
        ThreatLevel::High,
    ),
    // Role manipulation
    ("role_rewrite", r"you\s+are\s+now\s+(a|an)\s+", ThreatLevel::Critical),
    ("new_instructions", r"new\s+instructions?:", ThreatLevel::High),
    (
        "system_override",
        r"system\s*:?\s*(prompt|override|command)",
        ThreatLevel::Critical,
    ),
    ("act_as", r"act\s+as\s+(if\s+)?you\s+(are|were)", ThreatLevel::Medium),
    // Identity gaslighting
    (
        "identity_rewrite",
        r"(you|your)\s+(real|actual|true)\s+(name|identity|role)\s+is",
        ThreatLevel::High,
    ),
    ("iu_youtuber", r"(IU|아이유).*(유튜버|youtuber)", ThreatLevel::Medium),
    ("owner_secretary", r"공장장.*(비서|secretary)", ThreatLevel::Medium),
    // Dangerous commands
    ("exec_command", r"\bexec\b.*command\s*=", ThreatLevel::Critical),
    ("rm_rf", r"rm\s+-rf", ThreatLevel::Critical),
    (
        "mass_delete",
        r"delete\s+all\s+(emails?|files?|data)",
        ThreatLevel::Critical,
    ),
    ("elevated_flag", r"elevated\s*=\s*true", ThreatLevel::High),
    // XML/tag injection
    ("system_tag", r"</?system>", ThreatLevel::High),
    (
        "turn_forgery",
        r"\]\s*\n\s*\[?(system|assistant|user)\]?:",
        ThreatLevel::High,
    ),
    // Attempt to forge the quarantine marker itself
    (
        "marker_forgery",
        r"<<<EXTERNAL_UNTRUSTED_CONTENT>>>",
        ThreatLevel::Low,
    ),
    // Credential extraction
    (
        "credential_probe",
        r"(show|reveal|tell)\s+(me\s+)?(your\s+)?(api[\s_-]?key|password|token|secret)",
        ThreatLevel::Critical,
    ),
    (
        "system_prompt_probe",
        r"what\s+is\s+your\s+(system|internal)\s+prompt",
        ThreatLevel::High,
    ),
];

/// Compiled ruleset, built once at first use.
static RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    RULE_TABLE
        .iter()
        .map(|(id, pattern, level)| PatternRule {
            id,
            regex: Regex::new(&format!("(?i){pattern}"))
                .unwrap_or_else(|e| panic!("invalid threat pattern {id}: {e}")),
            level: *level,
        })
        .collect()
});

/// Evidence for a single pattern match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchEvidence {
    /// Rule that fired.
    pub rule_id: String,
    /// The matched text.
    pub matched_text: String,
    /// Byte offset of the match in the scanned text.
    pub position: usize,
    /// Severity of the rule.
    pub level: ThreatLevel,
}

/// Result of scanning one piece of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// True when at least one rule matched.
    pub is_suspicious: bool,
    /// Maximum severity over all matches ([`ThreatLevel::Safe`] when
    /// nothing matched).
    pub level: ThreatLevel,
    /// Evidence for every match, in rule order.
    pub matches: Vec<MatchEvidence>,
    /// Confidence that the text is an attack, in `[0, 1]`. Monotonic:
    /// more matches or a worse max level never lowers it.
    pub confidence: f64,
    /// When the scan ran.
    pub timestamp: DateTime<Utc>,
}

impl ScanResult {
    fn clean() -> Self {
        Self {
            is_suspicious: false,
            level: ThreatLevel::Safe,
            matches: Vec::new(),
            confidence: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Pattern-based injection scanner over the fixed ruleset.
#[derive(Debug, Clone, Copy)]
pub struct ThreatScanner {
    enabled: bool,
}

impl ThreatScanner {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Scan text against every rule in the ruleset.
    ///
    /// Never panics, including on empty, whitespace-only, mixed-script,
    /// or zero-width input.
    pub fn scan(&self, text: &str) -> ScanResult {
        if !self.enabled || text.trim().is_empty() {
            return ScanResult::clean();
        }

        let mut matches = Vec::new();
        let mut max_level = ThreatLevel::Safe;

        for rule in RULES.iter() {
            for m in rule.regex.find_iter(text) {
                matches.push(MatchEvidence {
                    rule_id: rule.id.to_string(),
                    matched_text: m.as_str().to_string(),
                    position: m.start(),
                    level: rule.level,
                });
                max_level = max_level.max(rule.level);
            }
        }

        let confidence = Self::confidence(&matches, max_level);

        ScanResult {
            is_suspicious: !matches.is_empty(),
            level: max_level,
            matches,
            confidence,
            timestamp: Utc::now(),
        }
    }

    /// More matches raise confidence; Critical/High hits set a floor.
    fn confidence(matches: &[MatchEvidence], max_level: ThreatLevel) -> f64 {
        if matches.is_empty() {
            return 0.0;
        }
        let base = (matches.len() as f64 * 0.3).min(1.0);
        match max_level {
            ThreatLevel::Critical => base.max(0.9),
            ThreatLevel::High => base.max(0.7),
            _ => base,
        }
    }

    /// Number of rules in the ruleset (for coverage assertions).
    pub fn rule_count() -> usize {
        RULES.len()
    }
}

// ── Tests ────────────────────────────────────────────────────────
