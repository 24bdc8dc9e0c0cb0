#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! The execution pipeline: preprocess → agent tool loop → postprocess.
//!
//! Each worker turn flows through three stages. Preprocess extracts file
//! content, sanitizes the prompt per interface, detects artifact intent, and
//! summarizes oversized conversations. The agent loop streams the chosen
//! model, dispatching tool calls until a final message arrives. Postprocess
//! extracts artifacts from the response and splits long output for the
//! client.
//!
//! Failure semantics: preprocess errors degrade to placeholders, tool errors
//! return to the agent, a streaming failure gets one non-streaming retry,
//! and postprocess extraction failures silently drop the artifact.

mod agent;
mod detector;
mod enrich;
mod error;
mod extract;
mod postprocess;
mod prompts;
mod sanitize;
mod splitter;
mod summarize;

pub use agent::{AgentLoop, AgentOutcome};
pub use detector::ArtifactDetector;
pub use enrich::enrich_message;
pub use error::{PipelineError, PipelineResult};
pub use extract::{
    ContentExtractor, Extraction, ExtractionRouter, ExtractionStatus, ImageExtractor,
    PdfExtractor, TextExtractor,
};
pub use postprocess::{ArtifactExtractor, extract_json_object};
pub use prompts::PromptComposer;
pub use sanitize::{DiscordStrategy, OutputStrategy, PassthroughStrategy, strategy_for_interface};
pub use splitter::split_message;
pub use summarize::Summarizer;
