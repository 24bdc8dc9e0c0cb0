#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! The streaming session hub.
//!
//! Multiplexes incremental tokens, tool events, status indicators, and
//! results out to connected clients, and carries `ask_user` answers back in.
//! Connections are registered behind the object-safe [`ConnectionSink`]
//! trait, so WebSocket sessions, test probes, and the admin SSE mirror all
//! plug in the same way.

mod animator;
mod hub;
mod reconnect;
mod status;

pub use animator::{AnimationTarget, StatusAnimator, is_status_message};
pub use hub::{ConnectionSink, SessionHub};
pub use reconnect::{InboundHandler, ReconnectingClient, ReconnectingClientConfig};
pub use status::status_message;
