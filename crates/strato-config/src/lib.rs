#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Runtime settings for the Strato orchestrator.
//!
//! All operational knobs come from environment variables with conservative
//! defaults, so a bare `strato-server` starts against a local Ollama without
//! any configuration. [`Settings::from_env`] reads the environment once at
//! startup; subsystems receive the values they need through the composition
//! root rather than re-reading the environment.

mod error;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use settings::{MaintenanceMode, Settings};
