//! Built-in profiles and the default model registry.
//!
//! The default registry backstops user-selected models that are not in the
//! active profile; it is not a profile and never participates in switching.

use std::collections::HashMap;

use crate::capability::{BackendKind, ModelCapability, ModelPriority};
use crate::profile::{Profile, RoleModels};

/// All declaratively defined profiles.
#[must_use]
pub fn builtin_profiles() -> Vec<Profile> {
    vec![performance(), conservative(), balanced()]
}

/// Performance profile: the large generation model runs on an external
/// SGLang server and is CRITICAL; two crashes inside the window trip the
/// circuit breaker and drop the platform to `conservative`.
fn performance() -> Profile {
    let models = vec![
        ModelCapability::new("gpt-oss:120b", BackendKind::Sglang, 65.0)
            .priority(ModelPriority::Critical)
            .thinking_level("high")
            .context_window(131_072),
        ModelCapability::new("gpt-oss:20b", BackendKind::Ollama, 13.0)
            .priority(ModelPriority::High)
            .thinking_level("medium")
            .context_window(131_072),
        ModelCapability::new("devstral-small-2:24b", BackendKind::Ollama, 15.0),
        ModelCapability::new("magistral:24b", BackendKind::Ollama, 14.0),
        ModelCapability::new("qwen3:4b", BackendKind::Ollama, 2.5),
        ModelCapability::new("ministral-3:14b", BackendKind::Ollama, 9.1)
            .vision()
            .context_window(131_072),
        ModelCapability::new("qwen3-vl:8b", BackendKind::Ollama, 6.1).vision().no_tools(),
        ModelCapability::new("qwen3-embedding:4b", BackendKind::Ollama, 2.5)
            .priority(ModelPriority::Low)
            .no_tools()
            .context_window(8192),
    ];

    Profile {
        name: "performance".to_string(),
        models,
        vram_soft_limit_gb: 100.0,
        vram_hard_limit_gb: 110.0,
        roles: RoleModels {
            router: "gpt-oss:20b".to_string(),
            simple_coder: "devstral-small-2:24b".to_string(),
            complex_coder: "gpt-oss:120b".to_string(),
            reasoning: "gpt-oss:120b".to_string(),
            research: "gpt-oss:120b".to_string(),
            math: "magistral:24b".to_string(),
            vision: "qwen3-vl:8b".to_string(),
            embedding: "qwen3-embedding:4b".to_string(),
            summarization: "gpt-oss:20b".to_string(),
            artifact_detection: "qwen3:4b".to_string(),
            artifact_extraction: "ministral-3:14b".to_string(),
        },
        fetch_limits: fetch_limits(&[("REASONING", 3), ("RESEARCH", 5)]),
    }
}

/// Conservative profile: everything on Ollama, mid-sized models, generous
/// headroom. This is the circuit breaker's landing zone.
fn conservative() -> Profile {
    let models = vec![
        ModelCapability::new("gpt-oss:20b", BackendKind::Ollama, 13.0)
            .priority(ModelPriority::Critical)
            .thinking_level("medium")
            .context_window(131_072),
        ModelCapability::new("devstral-small-2:24b", BackendKind::Ollama, 15.0),
        ModelCapability::new("magistral:24b", BackendKind::Ollama, 14.0),
        ModelCapability::new("qwen3:4b", BackendKind::Ollama, 2.5),
        ModelCapability::new("ministral-3:14b", BackendKind::Ollama, 9.1)
            .vision()
            .context_window(131_072),
        ModelCapability::new("qwen3-vl:8b", BackendKind::Ollama, 6.1).vision().no_tools(),
        ModelCapability::new("qwen3-embedding:4b", BackendKind::Ollama, 2.5)
            .priority(ModelPriority::Low)
            .no_tools()
            .context_window(8192),
    ];

    Profile {
        name: "conservative".to_string(),
        models,
        vram_soft_limit_gb: 60.0,
        vram_hard_limit_gb: 70.0,
        roles: RoleModels {
            router: "gpt-oss:20b".to_string(),
            simple_coder: "devstral-small-2:24b".to_string(),
            complex_coder: "devstral-small-2:24b".to_string(),
            reasoning: "gpt-oss:20b".to_string(),
            research: "gpt-oss:20b".to_string(),
            math: "magistral:24b".to_string(),
            vision: "qwen3-vl:8b".to_string(),
            embedding: "qwen3-embedding:4b".to_string(),
            summarization: "qwen3:4b".to_string(),
            artifact_detection: "qwen3:4b".to_string(),
            artifact_extraction: "ministral-3:14b".to_string(),
        },
        fetch_limits: fetch_limits(&[("REASONING", 2), ("RESEARCH", 3)]),
    }
}

/// Balanced profile: a large local reasoning model, no external backends.
fn balanced() -> Profile {
    let models = vec![
        ModelCapability::new("gpt-oss:120b", BackendKind::Ollama, 65.0)
            .priority(ModelPriority::High)
            .thinking_level("high")
            .context_window(131_072),
        ModelCapability::new("gpt-oss:20b", BackendKind::Ollama, 13.0)
            .priority(ModelPriority::Critical)
            .thinking_level("medium")
            .context_window(131_072),
        ModelCapability::new("devstral-small-2:24b", BackendKind::Ollama, 15.0),
        ModelCapability::new("magistral:24b", BackendKind::Ollama, 14.0),
        ModelCapability::new("qwen3:4b", BackendKind::Ollama, 2.5),
        ModelCapability::new("ministral-3:14b", BackendKind::Ollama, 9.1)
            .vision()
            .context_window(131_072),
        ModelCapability::new("qwen3-vl:8b", BackendKind::Ollama, 6.1).vision().no_tools(),
        ModelCapability::new("qwen3-embedding:4b", BackendKind::Ollama, 2.5)
            .priority(ModelPriority::Low)
            .no_tools()
            .context_window(8192),
    ];

    Profile {
        name: "balanced".to_string(),
        models,
        vram_soft_limit_gb: 100.0,
        vram_hard_limit_gb: 110.0,
        roles: RoleModels {
            router: "gpt-oss:20b".to_string(),
            simple_coder: "devstral-small-2:24b".to_string(),
            complex_coder: "gpt-oss:120b".to_string(),
            reasoning: "gpt-oss:120b".to_string(),
            research: "gpt-oss:120b".to_string(),
            math: "magistral:24b".to_string(),
            vision: "qwen3-vl:8b".to_string(),
            embedding: "qwen3-embedding:4b".to_string(),
            summarization: "gpt-oss:20b".to_string(),
            artifact_detection: "qwen3:4b".to_string(),
            artifact_extraction: "ministral-3:14b".to_string(),
        },
        fetch_limits: fetch_limits(&[("REASONING", 3), ("RESEARCH", 5)]),
    }
}

fn fetch_limits(entries: &[(&str, u32)]) -> HashMap<String, u32> {
    entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

/// Default capabilities for commonly installed Ollama models.
///
/// Sizes track what `ollama list` reports for these tags.
#[must_use]
pub fn default_capabilities(model_id: &str) -> Option<ModelCapability> {
    let cap = match model_id {
        "qwen3:4b" => ModelCapability::new("qwen3:4b", BackendKind::Ollama, 2.5),
        "rnj-1:8b" => ModelCapability::new("rnj-1:8b", BackendKind::Ollama, 5.1),
        "qwen3-vl:8b" => {
            ModelCapability::new("qwen3-vl:8b", BackendKind::Ollama, 6.1).vision().no_tools()
        },
        "deepseek-ocr:3b" => {
            ModelCapability::new("deepseek-ocr:3b", BackendKind::Ollama, 6.7).vision()
        },
        "ministral-3:14b" => ModelCapability::new("ministral-3:14b", BackendKind::Ollama, 9.1)
            .vision()
            .context_window(131_072),
        "gpt-oss:20b" => ModelCapability::new("gpt-oss:20b", BackendKind::Ollama, 13.0)
            .thinking_level("medium")
            .context_window(131_072),
        "magistral:24b" => ModelCapability::new("magistral:24b", BackendKind::Ollama, 14.0),
        "devstral-small-2:24b" => {
            ModelCapability::new("devstral-small-2:24b", BackendKind::Ollama, 15.0)
        },
        "nemotron-3-nano:30b" => {
            ModelCapability::new("nemotron-3-nano:30b", BackendKind::Ollama, 24.0)
        },
        "deepseek-r1:70b" => ModelCapability::new("deepseek-r1:70b", BackendKind::Ollama, 42.0)
            .no_tools()
            .thinking()
            .context_window(131_072),
        "gpt-oss:120b" => ModelCapability::new("gpt-oss:120b", BackendKind::Ollama, 65.0)
            .thinking_level("high")
            .context_window(131_072),
        "devstral-2:123b" => ModelCapability::new("devstral-2:123b", BackendKind::Ollama, 74.0),
        "qwen3-embedding:4b" => ModelCapability::new("qwen3-embedding:4b", BackendKind::Ollama, 2.5)
            .priority(ModelPriority::Low)
            .no_tools()
            .context_window(8192),
        _ => return None,
    };
    Some(cap)
}

/// Last-resort capability for a model unknown to every registry.
///
/// Conservative 8 GB estimate, tools assumed available, thinking off.
#[must_use]
pub fn generic_capability(model_id: &str) -> ModelCapability {
    ModelCapability::new(model_id, BackendKind::Ollama, 8.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performance_has_critical_sglang_model() {
        let profile = performance();
        let cap = profile.capability("gpt-oss:120b").unwrap();
        assert_eq!(cap.priority, ModelPriority::Critical);
        assert_eq!(cap.backend, BackendKind::Sglang);
    }

    #[test]
    fn test_conservative_is_ollama_only() {
        let profile = conservative();
        assert!(profile.models.iter().all(|m| m.backend == BackendKind::Ollama));
    }

    #[test]
    fn test_default_registry_lookup() {
        let cap = default_capabilities("deepseek-r1:70b").unwrap();
        assert!(!cap.supports_tools);
        assert!(cap.supports_thinking);
        assert!(default_capabilities("made-up:1b").is_none());
    }

    #[test]
    fn test_generic_capability_is_conservative() {
        let cap = generic_capability("mystery:7b");
        assert!((cap.vram_size_gb - 8.0).abs() < f64::EPSILON);
        assert_eq!(cap.priority, ModelPriority::Normal);
        assert!(cap.supports_tools);
    }
}
