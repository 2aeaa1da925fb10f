use anyhow::Context;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{SettingsError, StoreError};
use crate::store::{CredentialStore, InMemoryStore, JsonFileStore};
use crate::webauthn::{cose_alg, ResidentKeyPolicy, UserVerificationPolicy};

/// Directory holding an override `Settings.toml`
pub const CONFIG_DIR_ENV: &str = "PASSKEY_RP_CONFIG_DIR";

/// Longest accepted ceremony timeout (one day)
pub const MAX_CHALLENGE_TIMEOUT_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub relying_party: RelyingPartySettings,
    pub ceremony: CeremonySettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelyingPartySettings {
    /// Effective domain the credentials are scoped to (e.g. "example.com")
    pub rp_id: String,
    pub rp_name: String,
    /// Exact origin browsers report in client data
    pub rp_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CeremonySettings {
    /// Advertised to the client as the ceremony timeout and used as challenge TTL
    pub challenge_timeout_seconds: u64,
    pub user_verification: UserVerificationPolicy,
    pub resident_key: ResidentKeyPolicy,
    /// Acceptable COSE algorithms, in order of preference
    pub algorithms: Vec<i64>,
    /// Create accounts on the first registration attempt
    pub auto_provision_users: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Snapshot path for the file backend
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Passkey Relying Party".to_string(),
            rp_origin: "http://localhost:8000".to_string(),
        }
    }
}

impl Default for CeremonySettings {
    fn default() -> Self {
        Self {
            challenge_timeout_seconds: 60,
            user_verification: UserVerificationPolicy::Preferred,
            resident_key: ResidentKeyPolicy::Discouraged,
            algorithms: vec![cose_alg::ES256, cose_alg::RS256],
            auto_provision_users: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CeremonySettings {
    /// User verification is only enforced when the policy demands it
    #[must_use]
    pub fn require_user_verification(&self) -> bool {
        self.user_verification == UserVerificationPolicy::Required
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> TimeDelta {
        i64::try_from(self.challenge_timeout_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    #[must_use]
    pub fn timeout_millis(&self) -> u64 {
        self.challenge_timeout_seconds.saturating_mul(1000)
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables, then
    /// initialize logging
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - The resulting configuration fails validation
    pub fn load() -> anyhow::Result<Self> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.validate().context("invalid relying party configuration")?;

        if let Err(e) = init_logging(&settings.logging.level) {
            eprintln!("Logger already initialized: {e}");
        }
        log::info!(
            "Relying party {} ({}) accepting origin {}",
            settings.relying_party.rp_id,
            settings.relying_party.rp_name,
            settings.relying_party.rp_origin
        );

        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSKEY_RP_CONFIG_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings() -> anyhow::Result<Self> {
        let mut settings = Self::default();

        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_toml_file(&default_config_path)?;
            println!("✓ Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
            let override_path = Path::new(&config_dir).join("Settings.toml");
            if override_path.exists() {
                settings = Self::from_toml_file(&override_path)?;
                println!("✓ Overriding settings from {}", override_path.display());
            } else {
                println!(
                    "ℹ {CONFIG_DIR_ENV} set but no Settings.toml found at: {}",
                    override_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a single TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings TOML
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        basic_toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_relying_party_env_overrides(&mut settings.relying_party);
        Self::apply_ceremony_env_overrides(&mut settings.ceremony);
        Self::apply_storage_env_overrides(&mut settings.storage);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_relying_party_env_overrides(rp_settings: &mut RelyingPartySettings) {
        if let Ok(rp_id) = std::env::var("RP_ID") {
            rp_settings.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("RP_NAME") {
            rp_settings.rp_name = rp_name;
        }
        if let Ok(rp_origin) = std::env::var("RP_ORIGIN") {
            rp_settings.rp_origin = rp_origin;
        }
    }

    fn apply_ceremony_env_overrides(ceremony_settings: &mut CeremonySettings) {
        Self::apply_parsed_env_override(
            "CHALLENGE_TIMEOUT_SECONDS",
            &mut ceremony_settings.challenge_timeout_seconds,
        );
        Self::apply_parsed_env_override(
            "USER_VERIFICATION",
            &mut ceremony_settings.user_verification,
        );
        Self::apply_parsed_env_override("RESIDENT_KEY", &mut ceremony_settings.resident_key);
        Self::apply_parsed_env_override(
            "AUTO_PROVISION_USERS",
            &mut ceremony_settings.auto_provision_users,
        );
    }

    fn apply_storage_env_overrides(storage_settings: &mut StorageSettings) {
        if let Ok(backend) = std::env::var("STORE_BACKEND") {
            match backend.trim().to_ascii_lowercase().as_str() {
                "memory" => storage_settings.backend = StorageBackend::Memory,
                "file" => storage_settings.backend = StorageBackend::File,
                other => eprintln!("⚠️  Ignoring unknown STORE_BACKEND `{other}`"),
            }
        }
        if let Ok(path) = std::env::var("STORE_PATH") {
            storage_settings.path = Some(PathBuf::from(path));
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Helper function to apply parsed environment variable overrides
    fn apply_parsed_env_override<T>(env_var: &str, target: &mut T)
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        if let Ok(value_str) = std::env::var(env_var) {
            match value_str.trim().parse::<T>() {
                Ok(value) => *target = value,
                Err(e) => eprintln!("⚠️  Ignoring invalid {env_var}: {e}"),
            }
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Check the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), SettingsError> {
        let rp = &self.relying_party;
        let origin = url::Url::parse(&rp.rp_origin)
            .map_err(|e| SettingsError::InvalidOrigin(format!("{}: {e}", rp.rp_origin)))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(SettingsError::InvalidOrigin(rp.rp_origin.clone()));
        }
        let Some(host) = origin.host_str() else {
            return Err(SettingsError::InvalidOrigin(rp.rp_origin.clone()));
        };
        if host != rp.rp_id && !host.ends_with(&format!(".{}", rp.rp_id)) {
            return Err(SettingsError::OriginOutsideRpId {
                host: host.to_string(),
                rp_id: rp.rp_id.clone(),
            });
        }

        if self.ceremony.algorithms.is_empty() {
            return Err(SettingsError::NoAlgorithms);
        }
        if self.ceremony.challenge_timeout_seconds == 0 {
            return Err(SettingsError::ZeroTimeout);
        }
        if self.ceremony.challenge_timeout_seconds > MAX_CHALLENGE_TIMEOUT_SECONDS {
            return Err(SettingsError::TimeoutTooLong {
                max: MAX_CHALLENGE_TIMEOUT_SECONDS,
            });
        }
        if self.storage.backend == StorageBackend::File && self.storage.path.is_none() {
            return Err(SettingsError::MissingStorePath);
        }
        Ok(())
    }

    /// Construct the configured credential store
    ///
    /// # Errors
    ///
    /// Returns an error if the file store snapshot cannot be opened
    pub async fn build_store(&self) -> Result<Arc<dyn CredentialStore>, StoreError> {
        match (self.storage.backend, &self.storage.path) {
            (StorageBackend::File, Some(path)) => {
                log::info!("Using JSON file credential store at {}", path.display());
                Ok(Arc::new(JsonFileStore::open(path).await?))
            }
            (StorageBackend::File, None) => Err(StoreError::Corrupt(
                "file backend configured without storage.path".to_string(),
            )),
            (StorageBackend::Memory, _) => {
                log::info!("Using in-memory credential store");
                Ok(Arc::new(InMemoryStore::new()))
            }
        }
    }
}

/// Initialize `env_logger` with the configured filter
///
/// # Errors
///
/// Returns an error if a global logger is already installed
pub fn init_logging(level: &str) -> Result<(), log::SetLoggerError> {
    env_logger::Builder::new().parse_filters(level).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Helper function to clean all relevant environment variables for tests
    fn clean_env_vars() {
        for var in [
            "RP_ID",
            "RP_NAME",
            "RP_ORIGIN",
            "CHALLENGE_TIMEOUT_SECONDS",
            "USER_VERIFICATION",
            "RESIDENT_KEY",
            "AUTO_PROVISION_USERS",
            "STORE_BACKEND",
            "STORE_PATH",
            CONFIG_DIR_ENV,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.relying_party.rp_id, "localhost");
        assert_eq!(settings.ceremony.challenge_timeout_seconds, 60);
        assert_eq!(settings.ceremony.timeout_millis(), 60_000);
        assert_eq!(settings.ceremony.algorithms, vec![-7, -257]);
        assert_eq!(settings.ceremony.user_verification, UserVerificationPolicy::Preferred);
        assert_eq!(settings.ceremony.resident_key, ResidentKeyPolicy::Discouraged);
        assert!(settings.ceremony.auto_provision_users);
        assert!(!settings.ceremony.require_user_verification());
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = basic_toml::from_str(
            r#"
            [relying_party]
            rp_id = "example.com"
            rp_origin = "https://login.example.com"

            [ceremony]
            user_verification = "required"
            "#,
        )
        .unwrap();

        assert_eq!(settings.relying_party.rp_id, "example.com");
        assert_eq!(settings.relying_party.rp_name, "Passkey Relying Party");
        assert!(settings.ceremony.require_user_verification());
        assert_eq!(settings.ceremony.challenge_timeout_seconds, 60);
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_configuration() {
        let mut settings = Settings::default();
        settings.relying_party.rp_origin = "not a url".to_string();
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidOrigin(_))));

        let mut settings = Settings::default();
        settings.relying_party.rp_origin = "https://evil-localhost".to_string();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::OriginOutsideRpId { .. })
        ));

        let mut settings = Settings::default();
        settings.ceremony.algorithms.clear();
        assert_eq!(settings.validate(), Err(SettingsError::NoAlgorithms));

        let mut settings = Settings::default();
        settings.ceremony.challenge_timeout_seconds = 0;
        assert_eq!(settings.validate(), Err(SettingsError::ZeroTimeout));

        let mut settings = Settings::default();
        settings.ceremony.challenge_timeout_seconds = 10_000_000_000_000;
        assert_eq!(
            settings.validate(),
            Err(SettingsError::TimeoutTooLong {
                max: MAX_CHALLENGE_TIMEOUT_SECONDS
            })
        );

        let mut settings = Settings::default();
        settings.storage.backend = StorageBackend::File;
        assert_eq!(settings.validate(), Err(SettingsError::MissingStorePath));
    }

    #[test]
    fn test_challenge_ttl_saturates() {
        let mut ceremony = CeremonySettings::default();
        assert_eq!(ceremony.challenge_ttl(), TimeDelta::seconds(60));

        ceremony.challenge_timeout_seconds = MAX_CHALLENGE_TIMEOUT_SECONDS;
        assert_eq!(ceremony.challenge_ttl(), TimeDelta::days(1));

        ceremony.challenge_timeout_seconds = u64::MAX;
        assert_eq!(ceremony.challenge_ttl(), TimeDelta::MAX);
    }

    #[test]
    fn test_subdomain_origin_is_accepted() {
        let mut settings = Settings::default();
        settings.relying_party.rp_id = "example.com".to_string();
        settings.relying_party.rp_origin = "https://auth.example.com:8443".to_string();
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clean_env_vars();

        std::env::set_var("RP_ID", "example.org");
        std::env::set_var("RP_ORIGIN", "https://example.org");
        std::env::set_var("CHALLENGE_TIMEOUT_SECONDS", "120");
        std::env::set_var("USER_VERIFICATION", "required");
        std::env::set_var("AUTO_PROVISION_USERS", "false");
        std::env::set_var("STORE_BACKEND", "file");
        std::env::set_var("STORE_PATH", "/tmp/passkeys.json");

        let mut settings = Settings::default();
        Settings::apply_env_overrides(&mut settings);

        assert_eq!(settings.relying_party.rp_id, "example.org");
        assert_eq!(settings.relying_party.rp_origin, "https://example.org");
        assert_eq!(settings.ceremony.challenge_timeout_seconds, 120);
        assert!(settings.ceremony.require_user_verification());
        assert!(!settings.ceremony.auto_provision_users);
        assert_eq!(settings.storage.backend, StorageBackend::File);
        assert_eq!(settings.storage.path, Some(PathBuf::from("/tmp/passkeys.json")));

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_ignored() {
        clean_env_vars();

        std::env::set_var("CHALLENGE_TIMEOUT_SECONDS", "soon");
        std::env::set_var("RESIDENT_KEY", "always");
        std::env::set_var("STORE_BACKEND", "postgres");

        let mut settings = Settings::default();
        Settings::apply_env_overrides(&mut settings);
        assert_eq!(settings.ceremony, CeremonySettings::default());
        assert_eq!(settings.storage.backend, StorageBackend::Memory);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_dir_overrides_base_settings() {
        clean_env_vars();

        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Settings.toml"),
            "[relying_party]\nrp_name = \"From config dir\"\n",
        )
        .unwrap();
        std::env::set_var(CONFIG_DIR_ENV, dir.path());

        let settings = Settings::load_base_settings().unwrap();
        assert_eq!(settings.relying_party.rp_name, "From config dir");
        assert_eq!(settings.relying_party.rp_id, "localhost");

        clean_env_vars();
    }

    #[tokio::test]
    async fn test_build_store_defaults_to_memory() {
        let store = Settings::default().build_store().await.unwrap();
        assert!(store.get_user("nobody").await.unwrap().is_none());
    }
}
