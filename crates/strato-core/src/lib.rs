#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Shared types for the Strato orchestrator.
//!
//! Everything that crosses a subsystem boundary lives here: identifiers,
//! client-facing events, user and file records, and the platform-wide error
//! surface. Subsystem crates keep their own error enums and convert into
//! [`StratoError`] at the boundary.

mod error;
mod event;
mod files;
mod ids;
mod user;

pub use error::{StratoError, StratoResult};
pub use event::{ArtifactSummary, ClientEvent, StatusKind};
pub use files::{Artifact, ArtifactType, FileRef};
pub use ids::{ClientId, RequestId, ThreadId, UserId};
pub use user::{
    AuthMethod, DEFAULT_SUMMARIZE_THRESHOLD, Tier, UserPreferences, UserRecord, UserRole,
};
