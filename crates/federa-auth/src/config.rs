//! Broker configuration.
//!
//! Backends are declared as a list tagged by `kind`. Well-known backends are
//! selected by `preset`; anything else spells out its attribute mapping.
//!
//! # Example (TOML)
//!
//! ```toml
//! [broker.identity]
//! link_by_email = true
//!
//! [[broker.backends]]
//! name = "koha"
//! kind = "credential"
//! preset = "koha"
//! api_url = "https://koha.example.fi/api/v1"
//!
//! [[broker.backends]]
//! name = "opas_student_adfs"
//! kind = "federation"
//! preset = "opas_student_adfs"
//! metadata_url = "https://adfs.example.fi/metadata.json"
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::{
    AccessRule, AttributeMapping, BackendRegistry, CredentialBackend, FederationBackend,
    OAuth2Backend, ProviderBackend,
};
use crate::identity::IdentityPolicy;
use crate::rate_limit::RateLimitPolicy;

/// Root broker configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Account linking policy.
    pub identity: IdentityPolicy,

    /// Outbound credential API settings.
    pub credential: CredentialClientConfig,

    /// IdP metadata cache settings.
    pub metadata: MetadataConfig,

    /// Configured backends.
    pub backends: Vec<BackendConfig>,
}

/// Outbound credential API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialClientConfig {
    /// Upper bound for one verification request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for CredentialClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// IdP metadata cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// How long fetched metadata is reused.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Upper bound for one metadata fetch.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Fetch metadata for every federation backend at startup.
    pub prefetch: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600), // 24 hours
            request_timeout: Duration::from_secs(10),
            prefetch: false,
        }
    }
}

/// One configured backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend name, used in URLs and audit entries.
    pub name: String,

    /// Disabled backends stay registered but refuse logins.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Overrides the preset's email requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_required: Option<bool>,

    /// Overrides the preset's access rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessRule>,

    /// Kind-specific settings.
    #[serde(flatten)]
    pub settings: BackendSettings,
}

fn default_enabled() -> bool {
    true
}

/// Kind-specific backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSettings {
    /// Federated (ADFS) login.
    Federation {
        /// Built-in attribute profile.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<FederationPreset>,
        /// Explicit attribute mapping, used when no preset is given.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mapping: Option<AttributeMapping>,
        /// IdP metadata document.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata_url: Option<Url>,
    },

    /// OAuth2 login with standard claims unless mapped otherwise.
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Explicit attribute mapping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mapping: Option<AttributeMapping>,
    },

    /// Local credential form exchanged against a remote API.
    Credential {
        /// Remote wire contract.
        preset: CredentialPreset,
        /// Base URL of the remote API.
        api_url: Url,
        /// Attempt limit.
        #[serde(default)]
        rate_limit: RateLimitPolicy,
    },
}

/// Built-in federation profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationPreset {
    /// City of Turku ADFS.
    TurkuAdfs,
    /// School ADFS.
    OpasAdfs,
    /// School ADFS restricted to students.
    OpasStudentAdfs,
}

/// Built-in credential protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPreset {
    /// Koha library card.
    Koha,
    /// Föli travel card account.
    Foli,
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl BrokerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - A backend name is empty or used twice
    /// - A federation backend has neither a preset nor a mapping
    /// - A mapping has an empty uid attribute
    /// - A rate limit or timeout is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credential.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "credential request_timeout must be > 0".to_string(),
            ));
        }
        if self.metadata.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "metadata request_timeout must be > 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            backend.validate()?;
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate backend name: '{}'",
                    backend.name
                )));
            }
        }
        Ok(())
    }

    /// Builds the backend registry from the configured backends.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn registry(&self) -> Result<BackendRegistry, ConfigError> {
        self.validate()?;
        let mut registry = BackendRegistry::new();
        for backend in &self.backends {
            registry.insert(backend.build()?, backend.enabled)?;
        }
        Ok(registry)
    }
}

impl BackendConfig {
    /// Validates this backend's settings.
    ///
    /// # Errors
    ///
    /// See [`BrokerConfig::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "backend name cannot be empty".to_string(),
            ));
        }

        match &self.settings {
            BackendSettings::Federation {
                preset: None,
                mapping: None,
                ..
            } => Err(ConfigError::Missing(format!(
                "backend '{}' needs a preset or a mapping",
                self.name
            ))),
            BackendSettings::Federation {
                mapping: Some(mapping),
                ..
            }
            | BackendSettings::OAuth2 {
                mapping: Some(mapping),
            } if mapping.uid.trim().is_empty() => Err(ConfigError::InvalidValue(format!(
                "backend '{}' maps an empty uid attribute",
                self.name
            ))),
            BackendSettings::Credential { rate_limit, .. }
                if rate_limit.max_attempts == 0 || rate_limit.window.is_zero() =>
            {
                Err(ConfigError::InvalidValue(format!(
                    "backend '{}' rate_limit must be > 0",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }

    /// Builds the backend described by this entry.
    ///
    /// Preset defaults apply first; `email_required` and `access` override
    /// them when set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` for a federation backend without preset
    /// or mapping.
    pub fn build(&self) -> Result<Arc<dyn ProviderBackend>, ConfigError> {
        let name = self.name.clone();
        let backend: Arc<dyn ProviderBackend> = match &self.settings {
            BackendSettings::Federation {
                preset,
                mapping,
                metadata_url,
            } => {
                let mut backend = match (preset, mapping) {
                    (_, Some(mapping)) => FederationBackend::new(name, mapping.clone()),
                    (Some(FederationPreset::TurkuAdfs), None) => {
                        FederationBackend::turku_adfs(name)
                    }
                    (Some(FederationPreset::OpasAdfs), None) => FederationBackend::opas_adfs(name),
                    (Some(FederationPreset::OpasStudentAdfs), None) => {
                        FederationBackend::opas_student_adfs(name)
                    }
                    (None, None) => {
                        return Err(ConfigError::Missing(format!(
                            "backend '{}' needs a preset or a mapping",
                            self.name
                        )));
                    }
                };
                if let Some(url) = metadata_url {
                    backend = backend.with_metadata_url(url.clone());
                }
                if let Some(required) = self.email_required {
                    backend = backend.with_email_required(required);
                }
                if let Some(access) = &self.access {
                    backend = backend.with_access(access.clone());
                }
                Arc::new(backend)
            }
            BackendSettings::OAuth2 { mapping } => {
                let mut backend = match mapping {
                    Some(mapping) => OAuth2Backend::with_mapping(name, mapping.clone()),
                    None => OAuth2Backend::new(name),
                };
                if let Some(required) = self.email_required {
                    backend = backend.with_email_required(required);
                }
                if let Some(access) = &self.access {
                    backend = backend.with_access(access.clone());
                }
                Arc::new(backend)
            }
            BackendSettings::Credential {
                preset,
                api_url,
                rate_limit,
            } => {
                let mut backend = match preset {
                    CredentialPreset::Koha => CredentialBackend::koha(name, api_url.clone()),
                    CredentialPreset::Foli => CredentialBackend::foli(name, api_url.clone()),
                }
                .with_rate_limit(*rate_limit);
                if let Some(required) = self.email_required {
                    backend = backend.with_email_required(required);
                }
                if let Some(access) = &self.access {
                    backend = backend.with_access(access.clone());
                }
                Arc::new(backend)
            }
        };
        Ok(backend)
    }
}
