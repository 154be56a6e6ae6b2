use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};

/// Looks up a provider secret by name. `None` is an ordinary outcome: the
/// provider simply cannot be queried.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, credential_ref: &str) -> Option<SecretString>;
}

/// Process environment, with `.env` loaded on construction. Empty values
/// count as missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn new() -> Self {
        Self
    }

    /// Load `.env` from the working directory (or a parent) before reading.
    pub fn with_dotenv() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("failed to load .env: {e}"),
        }
        Self
    }
}

impl CredentialResolver for EnvCredentials {
    fn resolve(&self, credential_ref: &str) -> Option<SecretString> {
        std::env::var(credential_ref)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(SecretString::from)
    }
}

/// Fixed name → secret table.
#[derive(Default)]
pub struct StaticCredentials {
    secrets: HashMap<String, SecretString>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, secret: &str) -> Self {
        self.secrets
            .insert(name.to_owned(), SecretString::from(secret.to_owned()));
        self
    }
}

impl CredentialResolver for StaticCredentials {
    fn resolve(&self, credential_ref: &str) -> Option<SecretString> {
        self.secrets
            .get(credential_ref)
            .map(|s| SecretString::from(s.expose_secret().to_owned()))
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("count", &self.secrets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_lookup() {
        let creds = StaticCredentials::new().with("OPENAI_API_KEY", "sk-test");
        let secret = creds.resolve("OPENAI_API_KEY").expect("should resolve");
        assert_eq!(secret.expose_secret(), "sk-test");
        assert!(creds.resolve("GROQ_API_KEY").is_none());
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = StaticCredentials::new().with("K", "super-secret");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn env_missing_is_none() {
        assert!(EnvCredentials::new()
            .resolve("CHATLIST_TEST_DEFINITELY_UNSET_KEY_4F1A")
            .is_none());
    }
}
