//! Configuration loading for factgate.
//!
//! Configuration is a single TOML file with per-subsystem sections.
//! Every field has a serde default so a missing file, a partial file,
//! and a fully specified file all produce a usable [`Config`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default LM Studio-style chat completions endpoint.
const DEFAULT_MODEL_URL: &str = "http://localhost:1234/v1/chat/completions";

/// Default gateway bind address.
const DEFAULT_HOST: &str = "0.0.0.0";

/// Default gateway port.
const DEFAULT_PORT: u16 = 5000;

// ── Model transport ──────────────────────────────────────────────

/// Settings for the chat-completion transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Chat completions endpoint URL.
    pub url: String,
    /// Sampling temperature for conversational turns.
    pub temperature: f64,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MODEL_URL.to_string(),
            temperature: 0.7,
            max_tokens: 1500,
            timeout_secs: 60,
        }
    }
}

// ── Memory ───────────────────────────────────────────────────────

/// Settings for the fact/quarantine memory subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory holding the JSON document stores. `None` uses the
    /// platform data dir (or `./memory` when unavailable).
    pub dir: Option<PathBuf>,
    /// Jaccard similarity above which an incoming claim is treated as
    /// a near-duplicate of an existing fact.
    pub duplicate_threshold: f64,
    /// How many recent facts to render into the model context.
    pub context_facts: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            duplicate_threshold: 0.75,
            context_facts: 10,
        }
    }
}

impl MemoryConfig {
    /// Resolve the memory directory, falling back to the platform data
    /// dir and finally to `./memory`.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "factgate")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("memory"))
    }
}

// ── Security ─────────────────────────────────────────────────────

/// Toggles for the trust pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Whether the inbound threat scanner runs at all.
    pub scanner_enabled: bool,
    /// Whether claims are verified against the truth table before
    /// storage.
    pub truth_enforcement: bool,
    /// Whether High/Critical inputs are wrapped with quarantine
    /// markers before generation.
    pub quarantine_suspicious_input: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            scanner_enabled: true,
            truth_enforcement: true,
            quarantine_suspicious_input: true,
        }
    }
}

// ── Command gate ─────────────────────────────────────────────────

/// Whitelist/blacklist configuration for the command-execution gate.
///
/// The gate logic itself is command-agnostic; the sets live here so an
/// operator can extend them without touching guard code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandGateConfig {
    /// Commands that execute automatically.
    pub whitelist: Vec<String>,
    /// Commands that are never executed, mapped to the reason they
    /// are banned. The blacklist is absolute: it wins over the
    /// whitelist and cannot be overridden by approval.
    pub blacklist: BTreeMap<String, String>,
    /// Maximum retained audit-log entries (oldest pruned first).
    pub audit_retention: usize,
}

impl Default for CommandGateConfig {
    fn default() -> Self {
        let whitelist = ["YT_SEARCH", "MAP", "WEATHER", "TIME"]
            .into_iter()
            .map(String::from)
            .collect();

        let blacklist = [
            ("EXEC", "Shell execution (RCE risk)"),
            ("SHELL", "Shell command (RCE risk)"),
            ("RUN", "Shell command (RCE risk)"),
            ("DELETE", "File deletion (data loss risk)"),
            ("WRITE", "File modification (data corruption risk)"),
            ("SPAWN", "Process spawn (resource exhaustion risk)"),
            ("EVAL", "Code evaluation (arbitrary code execution)"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            whitelist,
            blacklist,
            audit_retention: 1000,
        }
    }
}

// ── Gateway server ───────────────────────────────────────────────

/// HTTP gateway bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// ── Owner profile ────────────────────────────────────────────────

/// Bootstrap identity of the person the secretary serves. Used to
/// seed the preferences document on first run and as the subject of
/// extracted facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerConfig {
    pub name: String,
    pub role: String,
    pub language: String,
    pub timezone: String,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            name: "공장장".to_string(),
            role: "Factory Owner".to_string(),
            language: "ko".to_string(),
            timezone: "Asia/Seoul".to_string(),
        }
    }
}

// ── Top-level config ─────────────────────────────────────────────

/// Full factgate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub memory: MemoryConfig,
    pub security: SecurityConfig,
    pub commands: CommandGateConfig,
    pub server: ServerConfig,
    pub owner: OwnerConfig,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults; a malformed file is an error (silent fallback would
    /// mask typos in security-relevant settings).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.model.url, DEFAULT_MODEL_URL);
        assert_eq!(config.server.port, 5000);
        assert!(config.commands.whitelist.contains(&"YT_SEARCH".to_string()));
        assert!(config.commands.blacklist.contains_key("EXEC"));
        assert!(config.security.scanner_enabled);
        assert_eq!(config.owner.name, "공장장");
    }

    #[test]
    fn blacklist_and_whitelist_are_disjoint_by_default() {
        let config = CommandGateConfig::default();
        for cmd in &config.whitelist {
            assert!(
                !config.blacklist.contains_key(cmd),
                "{cmd} is both whitelisted and blacklisted"
            );
        }
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [commands]
            whitelist = ["TIME"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.port, 8080);
        assert_eq!(parsed.server.host, DEFAULT_HOST);
        assert_eq!(parsed.commands.whitelist, vec!["TIME".to_string()]);
        // Untouched sections keep their defaults.
        assert!(parsed.commands.blacklist.contains_key("EVAL"));
        assert_eq!(parsed.memory.duplicate_threshold, 0.75);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/factgate.toml")).unwrap();
        assert_eq!(config.model.temperature, 0.7);
    }
}
