//! Victim selection strategies.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::registry::LoadedModel;
use strato_profile::ModelPriority;

/// Chooses models to unload to make room for a new one.
///
/// Implementations never select CRITICAL or external models. The orchestrator
/// stays strategy-agnostic; deployments pick one by name via
/// [`strategy_by_name`].
pub trait EvictionStrategy: Send + Sync {
    /// Select victims, in eviction order, to free at least
    /// `current_usage_gb + required_gb - hard_limit_gb`.
    ///
    /// Returns an empty list when no eviction is needed. May return victims
    /// that collectively fall short; the orchestrator checks the freed total
    /// and refuses to partially evict.
    fn select_victims(
        &self,
        loaded: &HashMap<String, LoadedModel>,
        required_gb: f64,
        current_usage_gb: f64,
        hard_limit_gb: f64,
    ) -> Vec<String>;

    /// Strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Space that must be freed, or `None` if admission already fits.
fn space_to_free(required_gb: f64, current_usage_gb: f64, hard_limit_gb: f64) -> Option<f64> {
    let deficit = current_usage_gb + required_gb - hard_limit_gb;
    (deficit > 0.0).then_some(deficit)
}

/// Candidates eligible for eviction: never CRITICAL, never external.
fn eligible(loaded: &HashMap<String, LoadedModel>) -> Vec<&LoadedModel> {
    loaded
        .values()
        .filter(|m| m.priority != ModelPriority::Critical && !m.is_external)
        .collect()
}

fn accumulate(candidates: Vec<&LoadedModel>, deficit: f64, strategy: &'static str) -> Vec<String> {
    let mut victims = Vec::new();
    let mut freed = 0.0;
    for model in candidates {
        victims.push(model.model_id.clone());
        freed += model.size_gb;
        debug!(
            model = %model.model_id,
            priority = %model.priority,
            size_gb = model.size_gb,
            "selected for eviction"
        );
        if freed >= deficit {
            break;
        }
    }
    if freed < deficit {
        warn!(
            strategy,
            freed_gb = freed,
            needed_gb = deficit,
            "eviction cannot free enough (protected models excluded)"
        );
    }
    info!(strategy, victims = victims.len(), freed_gb = freed, "eviction selection");
    victims
}

/// Priority-weighted LRU: lowest priority first, oldest first within a
/// priority, larger models first among equals (fewer victims).
#[derive(Debug, Default)]
pub struct HybridEviction;

impl EvictionStrategy for HybridEviction {
    fn select_victims(
        &self,
        loaded: &HashMap<String, LoadedModel>,
        required_gb: f64,
        current_usage_gb: f64,
        hard_limit_gb: f64,
    ) -> Vec<String> {
        let Some(deficit) = space_to_free(required_gb, current_usage_gb, hard_limit_gb) else {
            return Vec::new();
        };

        let mut candidates = eligible(loaded);
        candidates.sort_by(|a, b| {
            b.priority
                .eviction_rank()
                .cmp(&a.priority.eviction_rank())
                .then(a.last_accessed.cmp(&b.last_accessed))
                .then(b.size_gb.total_cmp(&a.size_gb))
        });

        accumulate(candidates, deficit, "hybrid")
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}

/// Classic LRU: oldest access first, priorities ignored (except the CRITICAL
/// and external protections).
#[derive(Debug, Default)]
pub struct LruEviction;

impl EvictionStrategy for LruEviction {
    fn select_victims(
        &self,
        loaded: &HashMap<String, LoadedModel>,
        required_gb: f64,
        current_usage_gb: f64,
        hard_limit_gb: f64,
    ) -> Vec<String> {
        let Some(deficit) = space_to_free(required_gb, current_usage_gb, hard_limit_gb) else {
            return Vec::new();
        };

        let mut candidates = eligible(loaded);
        candidates.sort_by(|a, b| a.last_accessed.cmp(&b.last_accessed));

        accumulate(candidates, deficit, "lru")
    }

    fn name(&self) -> &'static str {
        "lru"
    }
}

/// Pure priority: lowest priority first, larger first within a priority.
#[derive(Debug, Default)]
pub struct PriorityEviction;

impl EvictionStrategy for PriorityEviction {
    fn select_victims(
        &self,
        loaded: &HashMap<String, LoadedModel>,
        required_gb: f64,
        current_usage_gb: f64,
        hard_limit_gb: f64,
    ) -> Vec<String> {
        let Some(deficit) = space_to_free(required_gb, current_usage_gb, hard_limit_gb) else {
            return Vec::new();
        };

        let mut candidates = eligible(loaded);
        candidates.sort_by(|a, b| {
            b.priority
                .eviction_rank()
                .cmp(&a.priority.eviction_rank())
                .then(b.size_gb.total_cmp(&a.size_gb))
        });

        accumulate(candidates, deficit, "priority")
    }

    fn name(&self) -> &'static str {
        "priority"
    }
}

/// Look up a strategy by configuration name, defaulting to hybrid.
#[must_use]
pub fn strategy_by_name(name: &str) -> Box<dyn EvictionStrategy> {
    match name.to_ascii_lowercase().as_str() {
        "lru" => Box::new(LruEviction),
        "priority" => Box::new(PriorityEviction),
        "hybrid" => Box::new(HybridEviction),
        other => {
            warn!(strategy = other, "unknown eviction strategy, using hybrid");
            Box::new(HybridEviction)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use strato_profile::BackendKind;

    fn model(
        id: &str,
        size_gb: f64,
        priority: ModelPriority,
        age_secs: i64,
        is_external: bool,
    ) -> (String, LoadedModel) {
        let now = Utc::now();
        (
            id.to_string(),
            LoadedModel {
                model_id: id.to_string(),
                backend: BackendKind::Ollama,
                size_gb,
                priority,
                loaded_at: now - Duration::seconds(age_secs),
                last_accessed: now - Duration::seconds(age_secs),
                is_external,
            },
        )
    }

    #[test]
    fn test_no_eviction_when_fits() {
        let loaded: HashMap<_, _> =
            [model("a", 20.0, ModelPriority::Normal, 10, false)].into_iter().collect();
        let victims = HybridEviction.select_victims(&loaded, 20.0, 20.0, 100.0);
        assert!(victims.is_empty());
    }

    #[test]
    fn test_exact_fit_needs_no_eviction() {
        let loaded: HashMap<_, _> =
            [model("a", 80.0, ModelPriority::Normal, 10, false)].into_iter().collect();
        // 80 + 20 == 100 exactly: admit without eviction.
        let victims = HybridEviction.select_victims(&loaded, 20.0, 80.0, 100.0);
        assert!(victims.is_empty());
    }

    #[test]
    fn test_hybrid_protects_critical() {
        // CRITICAL 60GB old, LOW 30GB fresh, hard 100, incoming 20 → needs 10.
        let loaded: HashMap<_, _> = [
            model("critical", 60.0, ModelPriority::Critical, 100, false),
            model("low", 30.0, ModelPriority::Low, 10, false),
        ]
        .into_iter()
        .collect();

        let victims = HybridEviction.select_victims(&loaded, 20.0, 90.0, 100.0);
        assert_eq!(victims, vec!["low".to_string()]);
    }

    #[test]
    fn test_hybrid_prefers_low_priority_over_older_normal() {
        let loaded: HashMap<_, _> = [
            model("old-normal", 10.0, ModelPriority::Normal, 1000, false),
            model("fresh-low", 10.0, ModelPriority::Low, 1, false),
        ]
        .into_iter()
        .collect();

        let victims = HybridEviction.select_victims(&loaded, 90.0, 20.0, 100.0);
        assert_eq!(victims.first().map(String::as_str), Some("fresh-low"));
    }

    #[test]
    fn test_hybrid_lru_within_priority() {
        let loaded: HashMap<_, _> = [
            model("newer", 10.0, ModelPriority::Normal, 5, false),
            model("older", 10.0, ModelPriority::Normal, 500, false),
        ]
        .into_iter()
        .collect();

        let victims = HybridEviction.select_victims(&loaded, 95.0, 20.0, 100.0);
        assert_eq!(victims.first().map(String::as_str), Some("older"));
    }

    #[test]
    fn test_external_never_selected() {
        let loaded: HashMap<_, _> = [
            model("ext", 65.0, ModelPriority::Normal, 1000, true),
            model("local", 10.0, ModelPriority::Normal, 10, false),
        ]
        .into_iter()
        .collect();

        let victims = LruEviction.select_victims(&loaded, 100.0, 10.0, 100.0);
        assert_eq!(victims, vec!["local".to_string()]);
    }

    #[test]
    fn test_lru_ignores_priority() {
        let loaded: HashMap<_, _> = [
            model("old-high", 10.0, ModelPriority::High, 1000, false),
            model("fresh-low", 10.0, ModelPriority::Low, 1, false),
        ]
        .into_iter()
        .collect();

        let victims = LruEviction.select_victims(&loaded, 95.0, 20.0, 100.0);
        assert_eq!(victims.first().map(String::as_str), Some("old-high"));
    }

    #[test]
    fn test_priority_prefers_larger_within_level() {
        let loaded: HashMap<_, _> = [
            model("small-low", 5.0, ModelPriority::Low, 10, false),
            model("big-low", 30.0, ModelPriority::Low, 10, false),
        ]
        .into_iter()
        .collect();

        let victims = PriorityEviction.select_victims(&loaded, 90.0, 35.0, 100.0);
        assert_eq!(victims.first().map(String::as_str), Some("big-low"));
    }

    #[test]
    fn test_strategy_by_name() {
        assert_eq!(strategy_by_name("lru").name(), "lru");
        assert_eq!(strategy_by_name("PRIORITY").name(), "priority");
        assert_eq!(strategy_by_name("anything").name(), "hybrid");
    }
}
