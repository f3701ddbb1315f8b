use crate::error::{Result, ServiceError};
use secrecy::{ExposeSecret, Secret};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Secret string wrapper that prevents accidental exposure
pub type SecretString = Secret<String>;

/// Name of the token signing secret
pub const SIGNING_SECRET_KEY: &str = "JWT_SECRET";

/// Default directory for mounted secret files (Docker / Kubernetes)
pub const DEFAULT_SECRETS_DIR: &str = "/run/secrets";

/// Secrets provider interface
pub trait SecretsProvider {
    /// Get a secret by key
    fn get_secret(&self, key: &str) -> Result<SecretString>;

    /// Check if a secret exists
    fn has_secret(&self, key: &str) -> bool;
}

/// Environment variable secrets provider
#[derive(Debug, Clone, Default)]
pub struct EnvSecretsProvider {
    prefix: String,
}

impl EnvSecretsProvider {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase())
    }
}

impl SecretsProvider for EnvSecretsProvider {
    fn get_secret(&self, key: &str) -> Result<SecretString> {
        env::var(self.env_key(key))
            .map(Secret::new)
            .map_err(|_| ServiceError::Config(format!("Secret '{}' not found in environment", key)))
    }

    fn has_secret(&self, key: &str) -> bool {
        env::var(self.env_key(key)).is_ok()
    }
}

/// File-based secrets provider: one file per key
#[derive(Debug, Clone)]
pub struct FileSecretsProvider {
    base_path: PathBuf,
}

impl FileSecretsProvider {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl SecretsProvider for FileSecretsProvider {
    fn get_secret(&self, key: &str) -> Result<SecretString> {
        let path = self.base_path.join(key);
        fs::read_to_string(&path)
            .map(|s| Secret::new(s.trim().to_string()))
            .map_err(|e| {
                ServiceError::Config(format!(
                    "Failed to read secret from {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    fn has_secret(&self, key: &str) -> bool {
        self.base_path.join(key).is_file()
    }
}

/// Multi-provider secrets manager with fallback chain
#[derive(Default)]
pub struct SecretsManager {
    providers: Vec<Box<dyn SecretsProvider + Send + Sync>>,
}

impl SecretsManager {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Add a provider to the chain (checked in order)
    pub fn add_provider<P: SecretsProvider + Send + Sync + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Environment first, then mounted secret files if the directory exists
    pub fn from_environment(secrets_dir: &Path) -> Self {
        info!("Initializing secrets manager");
        let mut manager = Self::new().add_provider(EnvSecretsProvider::default());

        if secrets_dir.is_dir() {
            debug!(dir = %secrets_dir.display(), "Adding file secrets provider");
            manager = manager.add_provider(FileSecretsProvider::new(secrets_dir));
        }

        manager
    }

    /// Get a secret, trying each provider in order
    pub fn get_secret(&self, key: &str) -> Result<SecretString> {
        for provider in &self.providers {
            if provider.has_secret(key) {
                return provider.get_secret(key);
            }
        }
        Err(ServiceError::Config(format!(
            "Secret '{}' not found in any provider",
            key
        )))
    }

    /// Load the token signing secret, refusing an empty value
    pub fn signing_secret(&self) -> Result<SecretString> {
        let secret = self.get_secret(SIGNING_SECRET_KEY)?;
        if secret.expose_secret().trim().is_empty() {
            return Err(ServiceError::Config(format!(
                "Secret '{}' must not be empty",
                SIGNING_SECRET_KEY
            )));
        }
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets_dir(entries: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (key, value) in entries {
            fs::write(dir.path().join(key), value).unwrap();
        }
        dir
    }

    #[test]
    fn test_file_provider_trims_contents() {
        let dir = secrets_dir(&[("JWT_SECRET", "from-file\n")]);

        let provider = FileSecretsProvider::new(dir.path());
        assert!(provider.has_secret("JWT_SECRET"));
        assert!(!provider.has_secret("missing"));
        assert_eq!(
            provider.get_secret("JWT_SECRET").unwrap().expose_secret(),
            "from-file"
        );
    }

    #[test]
    fn test_manager_fallback_chain() {
        let first = secrets_dir(&[("a", "from-first")]);
        let second = secrets_dir(&[("a", "from-second"), ("b", "only-second")]);

        let manager = SecretsManager::new()
            .add_provider(FileSecretsProvider::new(first.path()))
            .add_provider(FileSecretsProvider::new(second.path()));

        assert_eq!(manager.get_secret("a").unwrap().expose_secret(), "from-first");
        assert_eq!(manager.get_secret("b").unwrap().expose_secret(), "only-second");
        assert!(manager.get_secret("c").is_err());
    }

    #[test]
    fn test_signing_secret_must_not_be_empty() {
        let dir = secrets_dir(&[(SIGNING_SECRET_KEY, "   ")]);
        let manager = SecretsManager::new().add_provider(FileSecretsProvider::new(dir.path()));

        assert!(matches!(manager.signing_secret(), Err(ServiceError::Config(_))));
    }

    #[test]
    fn test_from_environment_reads_mounted_files() {
        let dir = secrets_dir(&[(SIGNING_SECRET_KEY, "mounted-secret")]);
        let manager = SecretsManager::from_environment(dir.path());

        // The environment wins when JWT_SECRET is exported
        if env::var(SIGNING_SECRET_KEY).is_err() {
            assert_eq!(manager.signing_secret().unwrap().expose_secret(), "mounted-secret");
        }
    }
}
