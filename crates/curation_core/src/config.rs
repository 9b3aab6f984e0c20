use std::{fs, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "curation.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub containers_path: String,
    pub items_path: String,
    pub request_timeout_ms: u64,
    /// How long the reconciler waits after the first queued edit before sending, so edits
    /// fired in quick succession leave as one call.
    pub coalesce_window_ms: u64,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/api".into(),
            containers_path: "sections".into(),
            items_path: "songs".into(),
            request_timeout_ms: 10_000,
            coalesce_window_ms: 150,
            event_capacity: 256,
        }
    }
}

impl Settings {
    /// Builds settings from an optional TOML document, then applies environment overrides
    /// looked up through `env`. Unparseable numbers are ignored.
    pub fn from_sources(raw_file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = match raw_file.map(toml::from_str::<Settings>) {
            Some(Ok(parsed)) => parsed,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring malformed curation config file");
                Settings::default()
            }
            None => Settings::default(),
        };

        if let Some(v) = env("CURATION_API_URL") {
            settings.api_base_url = v;
        }
        if let Some(v) = env("APP__API_BASE_URL") {
            settings.api_base_url = v;
        }
        if let Some(v) = env("APP__CONTAINERS_PATH") {
            settings.containers_path = v;
        }
        if let Some(v) = env("APP__ITEMS_PATH") {
            settings.items_path = v;
        }
        if let Some(v) = env("APP__REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            settings.request_timeout_ms = v;
        }
        if let Some(v) = env("APP__COALESCE_WINDOW_MS").and_then(|v| v.parse().ok()) {
            settings.coalesce_window_ms = v;
        }
        if let Some(v) = env("APP__EVENT_CAPACITY").and_then(|v| v.parse().ok()) {
            settings.event_capacity = v;
        }

        settings
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn api_base_url(&self) -> anyhow::Result<Url> {
        let raw = self.api_base_url.trim();
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        Url::parse(&normalized).with_context(|| format!("invalid api base url '{raw}'"))
    }
}

/// Reads `curation.toml` (or the file named by `CURATION_CONFIG`) and the process environment.
pub fn load_settings() -> Settings {
    let path = std::env::var("CURATION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let raw = fs::read_to_string(&path).ok();
    Settings::from_sources(raw.as_deref(), |key| std::env::var(key).ok())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
