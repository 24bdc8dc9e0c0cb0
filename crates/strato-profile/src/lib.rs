#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Hardware/model profiles for the Strato orchestrator.
//!
//! A [`Profile`] bundles a model roster with VRAM limits, a role→model map,
//! and per-route fetch limits, describing one target hardware configuration.
//! The [`ProfileRegistry`] holds the active profile and supports atomic
//! runtime swaps; the [`ProfileManager`] layers the crash circuit breaker's
//! fallback/recovery state machine on top.

mod builtin;
mod capability;
mod error;
mod manager;
mod profile;
mod registry;

pub use builtin::{builtin_profiles, default_capabilities, generic_capability};
pub use capability::{BackendKind, ModelCapability, ModelPriority, ThinkingFormat};
pub use error::{ProfileError, ProfileResult};
pub use manager::{FallbackStatus, HttpRecoveryProbe, ProfileManager, RecoveryProbe};
pub use profile::{Profile, RoleModels};
pub use registry::ProfileRegistry;
