//! Loaded-model bookkeeping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use strato_profile::{BackendKind, ModelPriority};

/// A model currently resident in memory.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModel {
    /// Model id.
    pub model_id: String,
    /// Backend serving it.
    pub backend: BackendKind,
    /// Estimated resident size.
    pub size_gb: f64,
    /// Eviction priority.
    pub priority: ModelPriority,
    /// When it was loaded.
    pub loaded_at: DateTime<Utc>,
    /// Last access, for LRU ordering.
    pub last_accessed: DateTime<Utc>,
    /// Pre-loaded by an external process; excluded from budget and eviction.
    pub is_external: bool,
}

/// Tracks loaded models and their access order.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, LoadedModel>,
}

impl ModelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly loaded model.
    pub fn register(
        &mut self,
        model_id: &str,
        backend: BackendKind,
        size_gb: f64,
        priority: ModelPriority,
        is_external: bool,
    ) {
        let now = Utc::now();
        self.models.insert(
            model_id.to_string(),
            LoadedModel {
                model_id: model_id.to_string(),
                backend,
                size_gb,
                priority,
                loaded_at: now,
                last_accessed: now,
                is_external,
            },
        );
    }

    /// Refresh a model's LRU timestamp.
    pub fn touch(&mut self, model_id: &str) {
        if let Some(model) = self.models.get_mut(model_id) {
            model.last_accessed = Utc::now();
        }
    }

    /// Remove a model.
    pub fn unregister(&mut self, model_id: &str) -> Option<LoadedModel> {
        self.models.remove(model_id)
    }

    /// Whether a model is registered.
    #[must_use]
    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Look up a model.
    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<&LoadedModel> {
        self.models.get(model_id)
    }

    /// All loaded models.
    #[must_use]
    pub fn all(&self) -> &HashMap<String, LoadedModel> {
        &self.models
    }

    /// Total size including external models (for status display).
    #[must_use]
    pub fn total_usage_gb(&self) -> f64 {
        self.models.values().map(|m| m.size_gb).sum()
    }

    /// Size of manageable (non-external) models only, the number admission
    /// compares against the hard limit.
    #[must_use]
    pub fn manageable_usage_gb(&self) -> f64 {
        self.models
            .values()
            .filter(|m| !m.is_external)
            .map(|m| m.size_gb)
            .sum()
    }

    /// Models on a specific backend.
    #[must_use]
    pub fn by_backend(&self, backend: BackendKind) -> Vec<&LoadedModel> {
        self.models.values().filter(|m| m.backend == backend).collect()
    }

    /// Test helper: backdate a model's last access.
    #[cfg(test)]
    pub(crate) fn set_last_accessed(&mut self, model_id: &str, when: DateTime<Utc>) {
        if let Some(model) = self.models.get_mut(model_id) {
            model.last_accessed = when;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_usage() {
        let mut registry = ModelRegistry::new();
        registry.register("a", BackendKind::Ollama, 10.0, ModelPriority::Normal, false);
        registry.register("b", BackendKind::Ollama, 5.0, ModelPriority::Low, false);
        assert!(registry.is_loaded("a"));
        assert!((registry.manageable_usage_gb() - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_external_excluded_from_manageable() {
        let mut registry = ModelRegistry::new();
        registry.register("local", BackendKind::Ollama, 10.0, ModelPriority::Normal, false);
        registry.register("ext", BackendKind::Sglang, 65.0, ModelPriority::Critical, true);
        assert!((registry.manageable_usage_gb() - 10.0).abs() < f64::EPSILON);
        assert!((registry.total_usage_gb() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_touch_updates_lru() {
        let mut registry = ModelRegistry::new();
        registry.register("a", BackendKind::Ollama, 1.0, ModelPriority::Normal, false);
        let before = registry.get("a").unwrap().last_accessed;
        registry.set_last_accessed("a", before - chrono::Duration::seconds(60));
        registry.touch("a");
        assert!(registry.get("a").unwrap().last_accessed > before - chrono::Duration::seconds(60));
    }

    #[test]
    fn test_unregister() {
        let mut registry = ModelRegistry::new();
        registry.register("a", BackendKind::Ollama, 1.0, ModelPriority::Normal, false);
        let removed = registry.unregister("a").unwrap();
        assert_eq!(removed.model_id, "a");
        assert!(!registry.is_loaded("a"));
        assert!(registry.unregister("a").is_none());
    }
}
