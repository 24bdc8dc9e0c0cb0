//! The preference resolution chokepoint.

use tracing::{debug, info};

use crate::route::ModelSource;
use strato_core::UserPreferences;
use strato_profile::Profile;

/// Default temperature when neither request nor user set one.
const DEFAULT_TEMPERATURE: f64 = 0.2;

/// The settings a turn actually runs with.
#[derive(Debug, Clone)]
pub struct ResolvedPreferences {
    /// Explicitly chosen model; `None` means the router decides.
    pub model: Option<String>,
    /// Whether routing is bypassed entirely.
    pub bypass_routing: bool,
    /// Sampling temperature.
    pub temperature: f64,
    /// Thinking override; `None` means model default.
    pub thinking_enabled: Option<bool>,
    /// Artifact detection model (always from the profile).
    pub artifact_detection_model: String,
    /// Artifact extraction model (always from the profile).
    pub artifact_extraction_model: String,
    /// Where the model choice came from.
    pub model_source: ModelSource,
}

/// Per-request override fields, extracted from the inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    /// Explicit model.
    pub model: Option<String>,
    /// Explicit temperature.
    pub temperature: Option<f64>,
    /// Explicit thinking switch.
    pub thinking_enabled: Option<bool>,
}

/// Resolves generation settings with one strict priority order:
/// request field > stored user preference > route default.
///
/// Every path through the pipeline goes through [`resolve`](Self::resolve);
/// nothing else re-derives model or temperature.
#[derive(Debug, Default)]
pub struct PreferenceResolver;

impl PreferenceResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolve the settings for one turn.
    #[must_use]
    pub fn resolve(
        &self,
        request: &RequestOverrides,
        user_prefs: &UserPreferences,
        profile: &Profile,
    ) -> ResolvedPreferences {
        let (model, bypass_routing, model_source) = if let Some(model) = &request.model {
            info!(%model, "using request model, bypassing routing");
            (Some(model.clone()), true, ModelSource::Request)
        } else if let Some(model) = &user_prefs.preferred_model {
            info!(%model, "using preferred model, bypassing routing");
            (Some(model.clone()), true, ModelSource::UserPreference)
        } else {
            debug!("no model preference, router will classify");
            (None, false, ModelSource::Router)
        };

        let temperature = request
            .temperature
            .or(user_prefs.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE);

        // None means "model default", so the override chain must preserve it.
        let thinking_enabled = request.thinking_enabled.or(user_prefs.thinking_enabled);

        ResolvedPreferences {
            model,
            bypass_routing,
            temperature,
            thinking_enabled,
            artifact_detection_model: profile.roles.artifact_detection.clone(),
            artifact_extraction_model: profile.roles.artifact_extraction.clone(),
            model_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strato_profile::builtin_profiles;

    fn profile() -> Profile {
        builtin_profiles()
            .into_iter()
            .find(|p| p.name == "performance")
            .unwrap()
    }

    #[test]
    fn test_request_model_wins() {
        let request = RequestOverrides {
            model: Some("devstral-small-2:24b".to_string()),
            ..RequestOverrides::default()
        };
        let prefs = UserPreferences {
            preferred_model: Some("gpt-oss:20b".to_string()),
            ..UserPreferences::default()
        };

        let resolved = PreferenceResolver::new().resolve(&request, &prefs, &profile());
        assert_eq!(resolved.model.as_deref(), Some("devstral-small-2:24b"));
        assert!(resolved.bypass_routing);
        assert_eq!(resolved.model_source, ModelSource::Request);
    }

    #[test]
    fn test_user_preference_second() {
        let prefs = UserPreferences {
            preferred_model: Some("gpt-oss:20b".to_string()),
            temperature: Some(0.8),
            ..UserPreferences::default()
        };

        let resolved =
            PreferenceResolver::new().resolve(&RequestOverrides::default(), &prefs, &profile());
        assert_eq!(resolved.model.as_deref(), Some("gpt-oss:20b"));
        assert_eq!(resolved.model_source, ModelSource::UserPreference);
        assert!((resolved.temperature - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_router_fallback() {
        let resolved = PreferenceResolver::new().resolve(
            &RequestOverrides::default(),
            &UserPreferences::default(),
            &profile(),
        );
        assert!(resolved.model.is_none());
        assert!(!resolved.bypass_routing);
        assert_eq!(resolved.model_source, ModelSource::Router);
        assert!((resolved.temperature - DEFAULT_TEMPERATURE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_thinking_none_means_model_default() {
        let resolved = PreferenceResolver::new().resolve(
            &RequestOverrides::default(),
            &UserPreferences::default(),
            &profile(),
        );
        assert!(resolved.thinking_enabled.is_none());

        let request = RequestOverrides {
            thinking_enabled: Some(false),
            ..RequestOverrides::default()
        };
        let prefs = UserPreferences {
            thinking_enabled: Some(true),
            ..UserPreferences::default()
        };
        let resolved = PreferenceResolver::new().resolve(&request, &prefs, &profile());
        assert_eq!(resolved.thinking_enabled, Some(false));
    }

    #[test]
    fn test_artifact_models_ignore_overrides() {
        let request = RequestOverrides {
            model: Some("my-model".to_string()),
            ..RequestOverrides::default()
        };
        let resolved =
            PreferenceResolver::new().resolve(&request, &UserPreferences::default(), &profile());
        let p = profile();
        assert_eq!(resolved.artifact_detection_model, p.roles.artifact_detection);
        assert_eq!(resolved.artifact_extraction_model, p.roles.artifact_extraction);
    }
}
