//! Startup-time backend registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::ProviderBackend;
use crate::config::ConfigError;
use crate::error::PipelineError;

/// A backend plus its enable flag.
#[derive(Debug, Clone)]
pub struct RegisteredBackend {
    /// The backend.
    pub backend: Arc<dyn ProviderBackend>,
    /// Disabled backends stay listed but refuse to authenticate.
    pub enabled: bool,
}

/// Name to backend map, built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, RegisteredBackend>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enabled backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already taken.
    pub fn register(&mut self, backend: impl ProviderBackend + 'static) -> Result<(), ConfigError> {
        self.insert(Arc::new(backend), true)
    }

    /// Registers a shared backend with an explicit enable flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or already taken.
    pub fn insert(
        &mut self,
        backend: Arc<dyn ProviderBackend>,
        enabled: bool,
    ) -> Result<(), ConfigError> {
        let name = backend.name().to_string();
        if name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "backend name cannot be empty".to_string(),
            ));
        }
        if self.backends.contains_key(&name) {
            return Err(ConfigError::InvalidValue(format!(
                "duplicate backend name: '{name}'"
            )));
        }
        tracing::debug!(backend = %name, kind = %backend.kind(), enabled, "registered backend");
        self.backends
            .insert(name, RegisteredBackend { backend, enabled });
        Ok(())
    }

    /// Registers a backend, builder style.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already taken.
    pub fn with(mut self, backend: impl ProviderBackend + 'static) -> Result<Self, ConfigError> {
        self.register(backend)?;
        Ok(self)
    }

    /// Resolves an enabled backend by name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownBackend`] for unregistered names and
    /// [`PipelineError::BackendDisabled`] for disabled ones.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderBackend>, PipelineError> {
        match self.backends.get(name) {
            Some(entry) if entry.enabled => Ok(Arc::clone(&entry.backend)),
            Some(_) => Err(PipelineError::BackendDisabled(name.to_string())),
            None => Err(PipelineError::UnknownBackend(name.to_string())),
        }
    }

    /// Looks up a backend regardless of its enable flag.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&RegisteredBackend> {
        self.backends.get(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
