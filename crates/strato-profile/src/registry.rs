//! The active-profile registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use tracing::info;

use crate::builtin::{builtin_profiles, default_capabilities, generic_capability};
use crate::capability::ModelCapability;
use crate::error::{ProfileError, ProfileResult};
use crate::profile::Profile;

/// Holds the registered profiles and the active one.
///
/// Switching is atomic: readers that already cloned the active `Arc` keep
/// seeing the old profile consistently; subsequent [`active`](Self::active)
/// calls see the new one. Reads never block behind a switch for longer than
/// the pointer swap.
pub struct ProfileRegistry {
    profiles: HashMap<String, Arc<Profile>>,
    active: RwLock<Arc<Profile>>,
}

impl ProfileRegistry {
    /// Create a registry with the built-in profiles, activating `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::UnknownProfile`] if `initial` is not a
    /// built-in name, or [`ProfileError::InvalidProfile`] if any profile
    /// fails validation.
    pub fn with_builtin(initial: &str) -> ProfileResult<Self> {
        let mut profiles = HashMap::new();
        for profile in builtin_profiles() {
            profile.validate()?;
            profiles.insert(profile.name.clone(), Arc::new(profile));
        }

        let active = profiles
            .get(initial)
            .cloned()
            .ok_or_else(|| ProfileError::UnknownProfile {
                name: initial.to_string(),
                available: available_names(&profiles),
            })?;

        info!(profile = %initial, models = active.models.len(), "profile registry initialized");

        Ok(Self {
            profiles,
            active: RwLock::new(active),
        })
    }

    /// The active profile.
    ///
    /// The returned `Arc` is a consistent snapshot; a concurrent switch does
    /// not mutate it.
    #[must_use]
    pub fn active(&self) -> Arc<Profile> {
        match self.active.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a valid Arc.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Name of the active profile.
    #[must_use]
    pub fn active_name(&self) -> String {
        self.active().name.clone()
    }

    /// Switch the active profile.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::UnknownProfile`] for unregistered names.
    pub fn switch(&self, name: &str) -> ProfileResult<()> {
        let next = self
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ProfileError::UnknownProfile {
                name: name.to_string(),
                available: available_names(&self.profiles),
            })?;

        let previous = {
            let mut guard = match self.active.write() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            let previous = guard.name.clone();
            *guard = next;
            previous
        };

        info!(from = %previous, to = %name, "profile switched");
        Ok(())
    }

    /// Resolve capabilities for a model.
    ///
    /// Lookup order: active profile roster, then the default registry of
    /// common models, then a synthesized generic capability. Never fails, so
    /// a user-selected model always gets conservative admission numbers.
    #[must_use]
    pub fn capabilities(&self, model_id: &str) -> ModelCapability {
        if let Some(cap) = self.active().capability(model_id) {
            return cap.clone();
        }
        if let Some(cap) = default_capabilities(model_id) {
            return cap;
        }
        generic_capability(model_id)
    }

    /// Names of all registered profiles.
    #[must_use]
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

fn available_names(profiles: &HashMap<String, Arc<Profile>>) -> String {
    let mut names: Vec<&str> = profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}

impl std::fmt::Debug for ProfileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileRegistry")
            .field("active", &self.active_name())
            .field("profiles", &self.profile_names())
            .finish()
    }
}
