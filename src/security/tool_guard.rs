//! Command-execution gate.
//!
//! Generated text may carry command tags in the fixed wire format
//! `[CMD: <NAME>|<ARGS>]` (`<NAME>` = `\w+`, `<ARGS>` = anything up to
//! the next `]`). The guard partitions every discovered tag three ways,
//! in strict precedence order:
//!
//! 1. blacklisted → blocked. The blacklist is absolute: it wins over
//!    the whitelist and cannot be overridden by approval.
//! 2. whitelisted → executed via the safe-action dispatcher.
//! 3. neither → pending approval; no action taken.
//!
//! Both sets come from configuration; the guard logic itself is
//! command-agnostic.

use crate::config::CommandGateConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

/// Command tag wire format. Bit-exact for interop: `[CMD: NAME|ARGS]`.
static CMD_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[CMD:\s*(\w+)\|([^\]]*)\]").unwrap());

/// Dangerous free-text shapes scanned for alongside command tags.
static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, DangerousToolKind)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)\brm\s+-(?:rf|fr)\b").unwrap(),
            DangerousToolKind::ShellExecution,
        ),
        (
            Regex::new(r"(?i)(api[_-]?key|password|token|secret)\s*=").unwrap(),
            DangerousToolKind::CredentialAccess,
        ),
    ]
});

/// A command tag parsed out of generated text. Transient: consumed by
/// the gate immediately, never persisted as an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTag {
    /// Uppercased command name.
    pub name: String,
    /// Raw argument text (untrimmed, exactly as written).
    pub raw_args: String,
    /// Byte offset of the tag in the scanned text.
    pub position: usize,
}

/// Parse every command tag in `text`, in order of appearance.
pub fn parse_command_tags(text: &str) -> Vec<CommandTag> {
    CMD_TAG
        .captures_iter(text)
        .map(|cap| CommandTag {
            name: cap[1].to_uppercase(),
            raw_args: cap[2].to_string(),
            position: cap.get(0).map_or(0, |m| m.start()),
        })
        .collect()
}

/// Category of a dangerous-tool finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerousToolKind {
    /// Blacklisted command tag.
    RestrictedCommand,
    /// Shell-execution shape in free text.
    ShellExecution,
    /// Credential assignment shape in free text.
    CredentialAccess,
}

/// One dangerous-tool finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMatch {
    pub kind: DangerousToolKind,
    pub matched_text: String,
    pub position: usize,
    /// The command name, when the finding is a tag.
    pub command: Option<String>,
}

/// Result of scanning one response for dangerous tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolScan {
    pub found: Vec<ToolMatch>,
    pub requires_approval: bool,
}

/// Gate decision for one command tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Blacklisted; never executed regardless of any other signal.
    Blocked { reason: String },
    /// Whitelisted; safe to dispatch.
    Whitelisted,
    /// Unknown; surfaced to a human-approval channel, no action taken.
    PendingApproval,
}

/// The command-execution gate.
#[derive(Debug, Clone)]
pub struct ToolGuard {
    whitelist: HashSet<String>,
    blacklist: BTreeMap<String, String>,
}

impl ToolGuard {
    pub fn from_config(config: &CommandGateConfig) -> Self {
        Self {
            whitelist: config
                .whitelist
                .iter()
                .map(|c| c.to_uppercase())
                .collect(),
            blacklist: config
                .blacklist
                .iter()
                .map(|(k, v)| (k.to_uppercase(), v.clone()))
                .collect(),
        }
    }

    /// Whether a command name is whitelisted (case-normalized).
    pub fn is_safe_command(&self, name: &str) -> bool {
        self.whitelist.contains(&name.to_uppercase())
    }

    /// Classify one tag. Blacklist membership is checked first and is
    /// final: a command present in both sets is blocked.
    pub fn classify(&self, tag: &CommandTag) -> GateDecision {
        if let Some(reason) = self.blacklist.get(&tag.name) {
            return GateDecision::Blocked {
                reason: reason.clone(),
            };
        }
        if self.whitelist.contains(&tag.name) {
            return GateDecision::Whitelisted;
        }
        GateDecision::PendingApproval
    }

    /// Scan generated text for dangerous tool usage: blacklisted
    /// command tags plus dangerous free-text shapes. Whitelisted and
    /// unknown tags are not findings here; they are handled by the
    /// gate's own classification, not the auditor.
    pub fn scan_for_dangerous_tools(&self, text: &str) -> ToolScan {
        let mut found = Vec::new();

        for tag in parse_command_tags(text) {
            if self.blacklist.contains_key(&tag.name) {
                found.push(ToolMatch {
                    kind: DangerousToolKind::RestrictedCommand,
                    matched_text: format!("[CMD: {}|{}]", tag.name, tag.raw_args),
                    position: tag.position,
                    command: Some(tag.name),
                });
            }
        }

        for (regex, kind) in DANGEROUS_PATTERNS.iter() {
            for m in regex.find_iter(text) {
                found.push(ToolMatch {
                    kind: *kind,
                    matched_text: m.as_str().to_string(),
                    position: m.start(),
                    command: None,
                });
            }
        }

        ToolScan {
            requires_approval: !found.is_empty(),
            found,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ToolGuard {
        ToolGuard::from_config(&CommandGateConfig::default())
    }

    fn tag(name: &str, args: &str) -> CommandTag {
        CommandTag {
            name: name.to_string(),
            raw_args: args.to_string(),
            position: 0,
        }
    }

    #[test]
    fn parse_wire_format_exactly() {
        let tags = parse_command_tags("before [CMD: YT_SEARCH|lofi beats] after");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "YT_SEARCH");
        assert_eq!(tags[0].raw_args, "lofi beats");
        assert_eq!(tags[0].position, 7);
    }

    #[test]
    fn parse_normalizes_name_case_and_keeps_args_raw() {
        let tags = parse_command_tags("[CMD: yt_search| Lofi Beats ]");
        assert_eq!(tags[0].name, "YT_SEARCH");
        assert_eq!(tags[0].raw_args, " Lofi Beats ");
    }

    #[test]
    fn parse_multiple_tags_in_order() {
        let tags = parse_command_tags("[CMD: TIME|][CMD: MAP|강남역] [CMD: WEATHER|Seoul]");
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["TIME", "MAP", "WEATHER"]);
        assert_eq!(tags[0].raw_args, "");
    }

    #[test]
    fn parse_ignores_malformed_tags() {
        assert!(parse_command_tags("[CMD: NO_PIPE]").is_empty());
        assert!(parse_command_tags("[CMD: BAD NAME|x]").is_empty());
        assert!(parse_command_tags("CMD: MAP|no brackets").is_empty());
    }

    #[test]
    fn blacklist_is_absolute() {
        let mut config = CommandGateConfig::default();
        // Even if an operator whitelists EXEC by mistake, the
        // blacklist must win.
        config.whitelist.push("EXEC".to_string());
        let guard = ToolGuard::from_config(&config);
        match guard.classify(&tag("EXEC", "rm -rf /")) {
            GateDecision::Blocked { reason } => assert!(reason.contains("RCE")),
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[test]
    fn whitelisted_command_executes() {
        assert_eq!(guard().classify(&tag("YT_SEARCH", "lofi")), GateDecision::Whitelisted);
        assert!(guard().is_safe_command("yt_search"));
        assert!(!guard().is_safe_command("EXEC"));
    }

    #[test]
    fn unknown_command_pends_approval() {
        assert_eq!(
            guard().classify(&tag("CALENDAR", "tomorrow 3pm")),
            GateDecision::PendingApproval
        );
    }

    #[test]
    fn scan_flags_blacklisted_tag_and_shell_shape() {
        let scan = guard().scan_for_dangerous_tools("sure! [CMD: EXEC|rm -rf /]");
        assert!(scan.requires_approval);
        assert!(scan
            .found
            .iter()
            .any(|m| m.kind == DangerousToolKind::RestrictedCommand
                && m.command.as_deref() == Some("EXEC")));
        assert!(scan
            .found
            .iter()
            .any(|m| m.kind == DangerousToolKind::ShellExecution));
    }

    #[test]
    fn scan_ignores_whitelisted_and_unknown_tags() {
        let scan = guard().scan_for_dangerous_tools("[CMD: YT_SEARCH|lofi] [CMD: CALENDAR|x]");
        assert!(!scan.requires_approval);
        assert!(scan.found.is_empty());
    }

    #[test]
    fn scan_flags_credential_assignment() {
        let scan = guard().scan_for_dangerous_tools("here: api_key=sk-abcdef123456");
        assert!(scan
            .found
            .iter()
            .any(|m| m.kind == DangerousToolKind::CredentialAccess));
    }
}
