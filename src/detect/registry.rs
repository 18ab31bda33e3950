use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

use super::backend::{DetectorBackend, SharedDetector};
use super::backends::StubBackend;

/// Registry of loaded detector backends.
///
/// Models are loaded once at startup and shared by every stream session.
pub struct BackendRegistry {
    backends: HashMap<String, SharedDetector>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<SharedDetector> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<SharedDetector> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the registry described by configuration.
///
/// The stub backend is always available; the configured backend becomes the
/// default and is warmed up before the server starts.
pub fn build_registry(settings: &DetectorSettings) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());

    match settings.backend.as_str() {
        "stub" => {}
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let model_path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract detector requires a model path"))?;
            let backend = super::backends::TractBackend::new(
                model_path,
                settings.input_width,
                settings.input_height,
            )?
            .with_threshold(settings.confidence);
            registry.register(backend);
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => {
            return Err(anyhow!(
                "tract detector requires the backend-tract feature"
            ))
        }
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    }
    registry.set_default(&settings.backend)?;

    let default = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    default
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?
        .warm_up()?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_backend_is_default() {
        let mut registry = BackendRegistry::new();
        assert!(registry.default_backend().is_none());
        registry.register(StubBackend::new());
        let default = registry.default_backend().unwrap();
        assert_eq!(default.lock().unwrap().name(), "stub");
        assert!(registry.set_default("missing").is_err());
        assert_eq!(registry.list(), vec!["stub".to_string()]);
    }

    #[test]
    fn build_registry_defaults_to_stub() {
        let registry = build_registry(&DetectorSettings::default()).unwrap();
        let default = registry.default_backend().unwrap();
        assert_eq!(default.lock().unwrap().name(), "stub");
    }

    #[test]
    fn build_registry_rejects_unknown_backend() {
        let settings = DetectorSettings {
            backend: "mystery".to_string(),
            ..DetectorSettings::default()
        };
        assert!(build_registry(&settings).is_err());
    }
}
