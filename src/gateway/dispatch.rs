//! Safe-command dispatch.
//!
//! The gate hands whitelisted `(type, args)` pairs to an
//! [`ActionDispatcher`] and reports the returned status string. The
//! default dispatcher builds URLs / status text without touching the
//! network, which keeps it honest in headless deployments and trivial
//! to exercise in tests; richer integrations implement the trait.

use chrono::Local;

/// Executes one whitelisted command and describes the outcome.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, command: &str, args: &str) -> String;
}

/// Default handlers for the stock whitelist.
pub struct DefaultDispatcher;

impl ActionDispatcher for DefaultDispatcher {
    fn dispatch(&self, command: &str, args: &str) -> String {
        let args = args.trim();
        match command {
            "YT_SEARCH" => {
                let url = format!(
                    "https://www.youtube.com/results?search_query={}",
                    urlencoding::encode(args)
                );
                tracing::info!(query = args, "YouTube search dispatched");
                format!("YouTube search ready: {url}")
            }
            "MAP" => {
                let url = format!(
                    "https://www.google.com/maps/search/{}",
                    urlencoding::encode(args)
                );
                tracing::info!(location = args, "Map search dispatched");
                format!("Map search ready: {url}")
            }
            "WEATHER" => {
                tracing::info!(location = args, "Weather query dispatched");
                format!("Weather lookup queued for {args}")
            }
            "TIME" => {
                let now = Local::now().format("%Y-%m-%d %H:%M:%S");
                format!("Current time: {now}")
            }
            other => format!("{other} executed"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
