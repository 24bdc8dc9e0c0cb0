//! The route set.

use serde::{Deserialize, Serialize};

use strato_profile::RoleModels;

/// Coarse classification of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Route {
    /// Integration, equations, calculations.
    Math,
    /// Single functions, small scripts, bug fixes.
    SimpleCode,
    /// System design, multi-component applications.
    ComplexCode,
    /// Comparisons, trade-offs, analytical questions.
    Reasoning,
    /// In-depth multi-source research.
    Research,
    /// General conversation; the router model answers itself.
    SelfHandle,
}

impl Route {
    /// All routes, in classification-prompt order.
    pub const ALL: [Self; 6] = [
        Self::Math,
        Self::SimpleCode,
        Self::ComplexCode,
        Self::Reasoning,
        Self::Research,
        Self::SelfHandle,
    ];

    /// Canonical label the classifier emits.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Math => "MATH",
            Self::SimpleCode => "SIMPLE_CODE",
            Self::ComplexCode => "COMPLEX_CODE",
            Self::Reasoning => "REASONING",
            Self::Research => "RESEARCH",
            Self::SelfHandle => "SELF_HANDLE",
        }
    }

    /// Parse an exact label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|route| route.label() == label)
    }

    /// Model assigned to this route in a profile's role map.
    #[must_use]
    pub fn model<'a>(self, roles: &'a RoleModels) -> &'a str {
        match self {
            Self::Math => &roles.math,
            Self::SimpleCode => &roles.simple_coder,
            Self::ComplexCode => &roles.complex_coder,
            Self::Reasoning => &roles.reasoning,
            Self::Research => &roles.research,
            Self::SelfHandle => &roles.router,
        }
    }

    /// Prompt file key for the route's task layer.
    #[must_use]
    pub fn prompt_key(self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::SimpleCode => "simple_code",
            Self::ComplexCode => "complex_code",
            Self::Reasoning => "reasoning",
            Self::Research => "research",
            Self::SelfHandle => "self_handle",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the resolved model came from, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// Explicit per-request field.
    Request,
    /// Stored user preference.
    UserPreference,
    /// Route default from the active profile.
    Router,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip() {
        for route in Route::ALL {
            assert_eq!(Route::from_label(route.label()), Some(route));
        }
        assert_eq!(Route::from_label("POETRY"), None);
    }

    #[test]
    fn test_route_models() {
        let profile = strato_profile::builtin_profiles()
            .into_iter()
            .find(|p| p.name == "performance")
            .unwrap();
        assert_eq!(Route::Math.model(&profile.roles), "magistral:24b");
        assert_eq!(Route::SelfHandle.model(&profile.roles), profile.roles.router);
    }
}
