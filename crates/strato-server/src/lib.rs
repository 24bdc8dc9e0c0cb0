#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! The Strato orchestrator server.
//!
//! This crate is the composition root: it instantiates every subsystem into
//! an [`AppContext`], spawns the background loops (workers, visibility
//! monitor, health checks, metrics writer, log cleanup, recovery poller),
//! and exposes the inbound surface: WebSocket chat, synchronous REST
//! submission, the admin SSE monitoring stream, and admin commands.

mod api;
mod auth;
mod context;
mod processor;
mod telemetry;
mod ws;

pub use api::build_router;
pub use auth::{AuthContext, AuthVerifier, StaticTokenVerifier};
pub use context::AppContext;
pub use processor::TurnProcessor;
pub use telemetry::init_telemetry;
