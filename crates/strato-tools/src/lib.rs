#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Agent tools for the Strato execution pipeline.
//!
//! Every tool implements [`Tool`]: a name, a description, a JSON schema, and
//! an `execute` that returns a [`ToolOutput`]; failure is encoded in the
//! result, never raised across the agent boundary. Tools receive the
//! per-turn [`ExecutionContext`] explicitly; nothing reads ambient state.

mod ask_user;
mod context;
mod exec;
mod files;
mod registry;
mod services;

pub use ask_user::AskUserTool;
pub use context::{ExecutionContext, ServiceEndpoints};
pub use exec::{ExecuteCommandTool, RunCodeTool};
pub use files::{GetFileContentTool, ListAttachmentsTool, ReadFileTool, WriteFileTool};
pub use registry::{Tool, ToolOutput, ToolRegistry};
pub use services::{
    BrainFetchTool, BrainSearchTool, GenerateImageTool, RecallTool, RememberTool, WebFetchTool,
    WebSearchTool,
};
