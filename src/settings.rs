use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_EXPORT_FORMAT: &str = "markdown";
pub const DEFAULT_STORE_PATH: &str = "chatlist-results.jsonl";
pub const DEFAULT_PROMPTS_PATH: &str = "chatlist-prompts.jsonl";

/// Every key the `[settings]` table may contain.
pub const KNOWN_KEYS: &[&str] = &[
    "timeout",
    "proxy",
    "log_level",
    "default_export_format",
    "store_path",
    "prompts_path",
];

/// Key-value settings source. Reads are synchronous; every typed accessor
/// falls back to a hardcoded default when the key is absent or unusable.
pub trait SettingsReader: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Per-request timeout, `timeout` key in seconds (fractions allowed).
    fn timeout(&self) -> Duration {
        let Some(raw) = self.get("timeout") else {
            return Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        };
        let parsed = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        match parsed {
            Some(timeout) => timeout,
            None => {
                tracing::warn!(value = %raw, "ignoring invalid timeout setting");
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
        }
    }

    /// Explicit proxy URL. `None` means connect directly; environment proxy
    /// variables are never consulted.
    fn proxy(&self) -> Option<String> {
        self.get("proxy")
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
    }

    fn log_level(&self) -> String {
        self.get("log_level")
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned())
    }

    fn export_format(&self) -> String {
        self.get("default_export_format")
            .unwrap_or_else(|| DEFAULT_EXPORT_FORMAT.to_owned())
    }

    fn store_path(&self) -> String {
        self.get("store_path")
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_owned())
    }

    /// File backing the saved-prompt library.
    fn prompts_path(&self) -> String {
        self.get("prompts_path")
            .unwrap_or_else(|| DEFAULT_PROMPTS_PATH.to_owned())
    }
}

/// In-memory settings, usually populated from the `[settings]` table of the
/// config file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_owned(), value.into());
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl SettingsReader for Settings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl FromIterator<(String, String)> for Settings {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
