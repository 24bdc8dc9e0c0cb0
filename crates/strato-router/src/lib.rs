#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Request routing for the Strato orchestrator.
//!
//! A small router model classifies each turn into a [`Route`], which selects
//! the generation model, prompt layers, and fetch limits. The
//! [`PreferenceResolver`] is the single chokepoint that overlays per-request
//! and per-user preferences on top of the routed defaults.

mod classifier;
mod resolver;
mod route;

pub use classifier::{CLASSIFICATION_PROMPT, RouteDecision, Router};
pub use resolver::{PreferenceResolver, RequestOverrides, ResolvedPreferences};
pub use route::{ModelSource, Route};
