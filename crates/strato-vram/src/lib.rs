#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! VRAM orchestration for unified-memory inference hosts.
//!
//! `nvidia-smi` is useless on DGX-class unified-memory machines, so the
//! orchestrator budgets by bookkeeping instead: every managed model carries a
//! size estimate from its profile capability, admission compares the managed
//! sum against the profile's hard limit, and eviction frees space by asking
//! the backends to unload victims. System-level truth comes from `free -b`
//! and PSI, which feed status and pressure warnings rather than admission.
//!
//! The pieces compose behind trait seams so tests and alternative
//! deployments can swap them: [`MemoryMonitor`], [`EvictionStrategy`],
//! [`BackendManager`], and the [`FallbackHook`] the crash circuit breaker
//! fires into.

mod backend;
mod crash;
mod error;
mod eviction;
mod monitor;
mod orchestrator;
mod registry;

pub use backend::{
    BackendManager, CompositeBackendManager, LoadOutcome, OllamaBackendManager,
    SglangBackendManager,
};
pub use crash::{CrashStatus, CrashTracker};
pub use error::{VramError, VramResult};
pub use eviction::{
    EvictionStrategy, HybridEviction, LruEviction, PriorityEviction, strategy_by_name,
};
pub use monitor::{MemoryMonitor, MemoryStatus, PsiMetrics, UnifiedMemoryMonitor};
pub use orchestrator::{FallbackHook, LoadedModelStatus, NoFallback, VramOrchestrator, VramStatus};
pub use registry::{LoadedModel, ModelRegistry};
