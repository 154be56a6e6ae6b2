pub mod credentials;

use std::collections::HashSet;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ChatlistError;

pub use credentials::{CredentialResolver, EnvCredentials, StaticCredentials};

/// One reachable chat-completion endpoint. Field names on the wire match the
/// `[[providers]]` tables of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub id: u64,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "url")]
    pub endpoint_url: String,
    #[serde(rename = "model")]
    pub upstream_model_id: String,
    /// Name of the secret, never the secret.
    #[serde(rename = "credential")]
    pub credential_ref: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_kind() -> String {
    "openai-compatible".to_owned()
}

fn default_active() -> bool {
    true
}

impl ProviderConfig {
    fn validate(&self) -> Result<(), ChatlistError> {
        let invalid = |what: &str| {
            ChatlistError::ConfigValidation(format!("provider {}: {what}", self.id))
        };
        if self.display_name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.upstream_model_id.trim().is_empty() {
            return Err(invalid("model must not be empty"));
        }
        if self.credential_ref.trim().is_empty() {
            return Err(invalid("credential must not be empty"));
        }
        let url = Url::parse(&self.endpoint_url)
            .map_err(|e| invalid(&format!("url '{}': {e}", self.endpoint_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(&format!(
                "url '{}' must be http or https",
                self.endpoint_url
            )));
        }
        Ok(())
    }
}

/// Provider records loaded from storage. Every mutation re-checks the whole
/// set and leaves the registry untouched on failure.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>) -> Result<Self, ChatlistError> {
        validate_set(&providers)?;
        Ok(Self { providers })
    }

    pub fn all(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn get(&self, id: u64) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Active providers, ordered by display name then id.
    pub fn list_active(&self) -> Vec<ProviderConfig> {
        let mut active: Vec<_> = self.providers.iter().filter(|p| p.active).cloned().collect();
        active.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        active
    }

    /// Exact display-name lookup for attributing a persisted result. Active
    /// providers take precedence over inactive ones with the same name.
    pub fn provider_id_for(&self, display_name: &str) -> Option<u64> {
        let mut matches = self
            .providers
            .iter()
            .filter(|p| p.display_name == display_name);
        let first = matches.next()?;
        if first.active {
            return Some(first.id);
        }
        Some(matches.find(|p| p.active).map_or(first.id, |p| p.id))
    }

    /// Insert a new provider or replace the one with the same id.
    pub fn upsert(&mut self, config: ProviderConfig) -> Result<(), ChatlistError> {
        let mut next = self.providers.clone();
        match next.iter().position(|p| p.id == config.id) {
            Some(pos) => next[pos] = config,
            None => next.push(config),
        }
        self.commit(next)
    }

    pub fn remove(&mut self, id: u64) -> Result<ProviderConfig, ChatlistError> {
        let pos = self
            .providers
            .iter()
            .position(|p| p.id == id)
            .ok_or(ChatlistError::UnknownProvider(id))?;
        Ok(self.providers.remove(pos))
    }

    pub fn set_active(&mut self, id: u64, active: bool) -> Result<(), ChatlistError> {
        let mut next = self.providers.clone();
        let slot = next
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ChatlistError::UnknownProvider(id))?;
        slot.active = active;
        self.commit(next)
    }

    fn commit(&mut self, next: Vec<ProviderConfig>) -> Result<(), ChatlistError> {
        validate_set(&next)?;
        self.providers = next;
        Ok(())
    }
}

fn validate_set(providers: &[ProviderConfig]) -> Result<(), ChatlistError> {
    let mut ids = HashSet::new();
    let mut active_names = HashSet::new();
    for provider in providers {
        provider.validate()?;
        if !ids.insert(provider.id) {
            return Err(ChatlistError::ConfigValidation(format!(
                "duplicate provider id {}",
                provider.id
            )));
        }
        if provider.active && !active_names.insert(provider.display_name.as_str()) {
            return Err(ChatlistError::ConfigValidation(format!(
                "display name '{}' is used by more than one active provider",
                provider.display_name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn provider(id: u64, name: &str, url: &str, kind: &str) -> ProviderConfig {
    ProviderConfig {
        id,
        display_name: name.to_owned(),
        endpoint_url: url.to_owned(),
        upstream_model_id: format!("model-{id}"),
        credential_ref: "TEST_KEY".to_owned(),
        kind: kind.to_owned(),
        active: true,
    }
}
