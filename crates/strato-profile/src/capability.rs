//! Model capability records.

use serde::{Deserialize, Serialize};

/// Inference backend a model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Ollama server.
    Ollama,
    /// SGLang server (`OpenAI`-compatible, externally managed).
    Sglang,
    /// vLLM server.
    Vllm,
    /// TensorRT-LLM runtime.
    Tensorrt,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::Sglang => write!(f, "sglang"),
            Self::Vllm => write!(f, "vllm"),
            Self::Tensorrt => write!(f, "tensorrt"),
        }
    }
}

/// Eviction priority. Lower numeric rank is more protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelPriority {
    /// Never evicted; crashes trip the circuit breaker.
    Critical,
    /// Frequently used.
    High,
    /// Default.
    Normal,
    /// Evicted first.
    Low,
}

impl ModelPriority {
    /// Eviction rank: higher means evict-first (LOW=4 ... CRITICAL=1).
    #[must_use]
    pub fn eviction_rank(self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Low => 4,
        }
    }
}

impl std::fmt::Display for ModelPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Normal => write!(f, "NORMAL"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// How a model expresses its thinking switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingFormat {
    /// `think: true/false`.
    #[default]
    Boolean,
    /// `think: "low" | "medium" | "high"`.
    Level,
}

/// Capability record for one model in a profile roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapability {
    /// Model id as the backend knows it.
    pub name: String,
    /// Backend the model runs on.
    pub backend: BackendKind,
    /// Custom endpoint; `None` uses the backend's configured default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Estimated resident size in GB.
    pub vram_size_gb: f64,
    /// Eviction priority.
    pub priority: ModelPriority,
    /// Whether the model handles tool calling.
    pub supports_tools: bool,
    /// Whether the model has a thinking mode.
    pub supports_thinking: bool,
    /// Whether the model accepts image input.
    #[serde(default)]
    pub supports_vision: bool,
    /// Thinking switch format.
    #[serde(default)]
    pub thinking_format: ThinkingFormat,
    /// Default level for [`ThinkingFormat::Level`] models.
    #[serde(default = "default_thinking_level")]
    pub default_thinking_level: String,
    /// Context window in tokens.
    pub context_window: u32,
    /// Backend keep-alive hint.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

fn default_thinking_level() -> String {
    "high".to_string()
}

fn default_keep_alive() -> String {
    "10m".to_string()
}

impl ModelCapability {
    /// Minimal constructor; builder methods refine the rest.
    pub fn new(name: impl Into<String>, backend: BackendKind, vram_size_gb: f64) -> Self {
        Self {
            name: name.into(),
            backend,
            endpoint: None,
            vram_size_gb,
            priority: ModelPriority::Normal,
            supports_tools: true,
            supports_thinking: false,
            supports_vision: false,
            thinking_format: ThinkingFormat::Boolean,
            default_thinking_level: default_thinking_level(),
            context_window: 32_768,
            keep_alive: default_keep_alive(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: ModelPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the context window.
    #[must_use]
    pub fn context_window(mut self, tokens: u32) -> Self {
        self.context_window = tokens;
        self
    }

    /// Enable graded thinking with the given default level.
    #[must_use]
    pub fn thinking_level(mut self, level: &str) -> Self {
        self.supports_thinking = true;
        self.thinking_format = ThinkingFormat::Level;
        self.default_thinking_level = level.to_string();
        self
    }

    /// Enable boolean thinking.
    #[must_use]
    pub fn thinking(mut self) -> Self {
        self.supports_thinking = true;
        self.thinking_format = ThinkingFormat::Boolean;
        self
    }

    /// Mark as a vision model.
    #[must_use]
    pub fn vision(mut self) -> Self {
        self.supports_vision = true;
        self
    }

    /// Disable tool calling.
    #[must_use]
    pub fn no_tools(mut self) -> Self {
        self.supports_tools = false;
        self
    }

    /// Set a custom endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_rank_order() {
        assert!(ModelPriority::Low.eviction_rank() > ModelPriority::Normal.eviction_rank());
        assert!(ModelPriority::Normal.eviction_rank() > ModelPriority::High.eviction_rank());
        assert!(ModelPriority::High.eviction_rank() > ModelPriority::Critical.eviction_rank());
    }

    #[test]
    fn test_builder_defaults() {
        let cap = ModelCapability::new("qwen3:4b", BackendKind::Ollama, 2.5);
        assert_eq!(cap.priority, ModelPriority::Normal);
        assert!(cap.supports_tools);
        assert!(!cap.supports_thinking);
        assert_eq!(cap.keep_alive, "10m");
    }

    #[test]
    fn test_thinking_level_builder() {
        let cap = ModelCapability::new("gpt-oss:20b", BackendKind::Ollama, 13.0)
            .thinking_level("medium");
        assert!(cap.supports_thinking);
        assert_eq!(cap.thinking_format, ThinkingFormat::Level);
        assert_eq!(cap.default_thinking_level, "medium");
    }
}
