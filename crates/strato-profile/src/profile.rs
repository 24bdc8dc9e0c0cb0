//! The [`Profile`] bundle and its validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::capability::ModelCapability;
use crate::error::{ProfileError, ProfileResult};

/// Role→model assignments for a profile.
///
/// Every role must name a model present in the profile roster; validation
/// enforces this at load time so routing can never select an unknown model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleModels {
    /// Classification model.
    pub router: String,
    /// Simple code tasks.
    pub simple_coder: String,
    /// System design and multi-component code.
    pub complex_coder: String,
    /// Analytical reasoning.
    pub reasoning: String,
    /// Deep research.
    pub research: String,
    /// Math.
    pub math: String,
    /// OCR / vision.
    pub vision: String,
    /// Embeddings.
    pub embedding: String,
    /// Conversation summarization.
    pub summarization: String,
    /// Artifact intent detection (YES/NO).
    pub artifact_detection: String,
    /// Artifact content extraction.
    pub artifact_extraction: String,
}

impl RoleModels {
    fn entries(&self) -> [(&'static str, &str); 11] {
        [
            ("router", &self.router),
            ("simple_coder", &self.simple_coder),
            ("complex_coder", &self.complex_coder),
            ("reasoning", &self.reasoning),
            ("research", &self.research),
            ("math", &self.math),
            ("vision", &self.vision),
            ("embedding", &self.embedding),
            ("summarization", &self.summarization),
            ("artifact_detection", &self.artifact_detection),
            ("artifact_extraction", &self.artifact_extraction),
        ]
    }
}

/// A named bundle of model roster, VRAM limits, role map, and fetch limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name ("performance", "conservative", "balanced").
    pub name: String,
    /// Models available in this profile.
    pub models: Vec<ModelCapability>,
    /// Soft VRAM limit in GB (pressure warnings).
    pub vram_soft_limit_gb: f64,
    /// Hard VRAM limit in GB (admission ceiling).
    pub vram_hard_limit_gb: f64,
    /// Role→model assignments.
    pub roles: RoleModels,
    /// Web-fetch source limits per route name.
    pub fetch_limits: HashMap<String, u32>,
}

impl Profile {
    /// Look up a model in this profile's roster.
    #[must_use]
    pub fn capability(&self, model_id: &str) -> Option<&ModelCapability> {
        self.models.iter().find(|m| m.name == model_id)
    }

    /// Fetch limit for a route, defaulting to 3.
    #[must_use]
    pub fn fetch_limit(&self, route: &str) -> u32 {
        self.fetch_limits.get(route).copied().unwrap_or(3)
    }

    /// Validate profile consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidProfile`] when a role maps to a model
    /// missing from the roster or the soft limit exceeds the hard limit.
    pub fn validate(&self) -> ProfileResult<()> {
        if self.vram_soft_limit_gb > self.vram_hard_limit_gb {
            return Err(ProfileError::InvalidProfile {
                name: self.name.clone(),
                message: format!(
                    "soft limit {:.1}GB exceeds hard limit {:.1}GB",
                    self.vram_soft_limit_gb, self.vram_hard_limit_gb
                ),
            });
        }

        for (role, model) in self.roles.entries() {
            if self.capability(model).is_none() {
                return Err(ProfileError::InvalidProfile {
                    name: self.name.clone(),
                    message: format!("role '{role}' maps to '{model}', which is not in the roster"),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::builtin_profiles;
    use crate::capability::{BackendKind, ModelCapability};

    fn minimal_profile() -> Profile {
        let roles = RoleModels {
            router: "m".to_string(),
            simple_coder: "m".to_string(),
            complex_coder: "m".to_string(),
            reasoning: "m".to_string(),
            research: "m".to_string(),
            math: "m".to_string(),
            vision: "m".to_string(),
            embedding: "m".to_string(),
            summarization: "m".to_string(),
            artifact_detection: "m".to_string(),
            artifact_extraction: "m".to_string(),
        };
        Profile {
            name: "test".to_string(),
            models: vec![ModelCapability::new("m", BackendKind::Ollama, 2.0)],
            vram_soft_limit_gb: 50.0,
            vram_hard_limit_gb: 60.0,
            roles,
            fetch_limits: HashMap::new(),
        }
    }

    #[test]
    fn test_valid_profile_passes() {
        minimal_profile().validate().unwrap();
    }

    #[test]
    fn test_missing_role_model_rejected() {
        let mut profile = minimal_profile();
        profile.roles.math = "absent".to_string();
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("math"));
    }

    #[test]
    fn test_soft_above_hard_rejected() {
        let mut profile = minimal_profile();
        profile.vram_soft_limit_gb = 100.0;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_all_builtin_profiles_validate() {
        for profile in builtin_profiles() {
            profile.validate().unwrap();
        }
    }

    #[test]
    fn test_fetch_limit_default() {
        let profile = minimal_profile();
        assert_eq!(profile.fetch_limit("RESEARCH"), 3);
    }
}
