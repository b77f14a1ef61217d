use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::{shared, Detector, SharedDetector};

/// Registry of named detector backends.
///
/// Backends are shared behind a `Mutex` because `Detector::detect` takes
/// `&mut self`.
pub struct DetectorRegistry {
    detectors: HashMap<String, SharedDetector>,
    default_name: Option<String>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            detectors: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend under its own name. The first registered backend
    /// becomes the default. Re-registering a name replaces the backend.
    pub fn register<D: Detector + 'static>(&mut self, detector: D) {
        let name = detector.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.detectors.insert(name, shared(detector));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.detectors.contains_key(name) {
            return Err(anyhow!(
                "detector '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedDetector> {
        self.detectors.get(name).cloned()
    }

    pub fn default_detector(&self) -> Option<SharedDetector> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.detectors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
