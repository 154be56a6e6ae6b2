use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChatlistError;
use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::settings::{KNOWN_KEYS, Settings};

const MAX_CONFIG_FILE_SIZE: u64 = 256 * 1024; // 256 KiB

pub const DEFAULT_CONFIG_PATH: &str = "chatlist.toml";

// --- TOML deserialization structs (private, map 1:1 to TOML schema) ---

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    settings: BTreeMap<String, toml::Value>,
    #[serde(default)]
    providers: Vec<ProviderConfig>,
}

#[derive(Deserialize)]
struct InlineProvider {
    provider: ProviderConfig,
}

#[derive(Serialize)]
struct ConfigFileRef<'a> {
    settings: &'a BTreeMap<String, String>,
    providers: &'a [ProviderConfig],
}

/// Parsed and validated config file: the settings store plus the provider
/// registry.
#[derive(Debug)]
pub struct Config {
    pub settings: Settings,
    pub registry: ProviderRegistry,
}

impl FromStr for Config {
    type Err = ChatlistError;

    fn from_str(content: &str) -> Result<Self, ChatlistError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ChatlistError::ConfigLoad(e.to_string()))?;

        if let Some(key) = file
            .settings
            .keys()
            .find(|key| !KNOWN_KEYS.contains(&key.as_str()))
        {
            return Err(ChatlistError::ConfigValidation(format!(
                "unknown setting '{key}' (expected one of: {})",
                KNOWN_KEYS.join(", ")
            )));
        }

        let settings = file
            .settings
            .into_iter()
            .map(|(key, value)| scalar(&key, value).map(|v| (key, v)))
            .collect::<Result<Settings, _>>()?;
        let registry = ProviderRegistry::new(file.providers)?;

        Ok(Self { settings, registry })
    }
}

impl Config {
    /// Load a config from a TOML file. Checks file size before reading.
    pub fn load(path: &Path) -> Result<Self, ChatlistError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            ChatlistError::ConfigLoad(format!("cannot read {}: {e}", path.display()))
        })?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ChatlistError::ConfigLoad(format!(
                "config file exceeds {MAX_CONFIG_FILE_SIZE} byte limit"
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ChatlistError::ConfigLoad(format!("cannot read {}: {e}", path.display()))
        })?;

        content.parse()
    }

    pub fn save(&self, path: &Path) -> Result<(), ChatlistError> {
        save(path, &self.settings, &self.registry)
    }
}

/// Write settings and providers back to `path`. Comments and formatting of
/// the previous file are not preserved; setting values are written as
/// strings.
pub fn save(
    path: &Path,
    settings: &Settings,
    registry: &ProviderRegistry,
) -> Result<(), ChatlistError> {
    let file = ConfigFileRef {
        settings: settings.as_map(),
        providers: registry.all(),
    };
    let content = toml::to_string_pretty(&file)
        .map_err(|e| ChatlistError::ConfigLoad(format!("cannot serialize config: {e}")))?;

    // Stage beside the target, then rename over it.
    let staging = path.with_extension("toml.tmp");
    std::fs::write(&staging, content).map_err(|e| {
        ChatlistError::ConfigLoad(format!("cannot write {}: {e}", staging.display()))
    })?;
    std::fs::rename(&staging, path).map_err(|e| {
        ChatlistError::ConfigLoad(format!("cannot replace {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), providers = registry.all().len(), "config saved");
    Ok(())
}

/// Parse one provider written as a TOML inline table, e.g.
/// `{ id = 4, name = "Local", url = "...", model = "llama3", credential = "KEY" }`.
/// Set-level checks happen when the registry takes it.
pub fn parse_provider(inline: &str) -> Result<ProviderConfig, ChatlistError> {
    let wrapped = format!("provider = {}", inline.trim());
    toml::from_str::<InlineProvider>(&wrapped)
        .map(|parsed| parsed.provider)
        .map_err(|e| ChatlistError::InvalidCommand(format!("provider table: {e}")))
}

/// Settings are a flat string map; TOML scalars are stringified.
fn scalar(key: &str, value: toml::Value) -> Result<String, ChatlistError> {
    match value {
        toml::Value::String(s) => Ok(s),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        _ => Err(ChatlistError::ConfigValidation(format!(
            "setting '{key}' must be a string, number or boolean"
        ))),
    }
}
