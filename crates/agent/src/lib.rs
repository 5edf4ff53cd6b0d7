//! The AI admin patch pipeline.
//!
//! Analyze the codebase, gather context for a request, ask the LLM for a
//! patch, validate it, then apply it through a [`sink::PatchSink`] and
//! record it in a [`store::PatchStore`]. [`service::PatchService`] wires
//! these together.

pub mod analyzer;
pub mod config;
pub mod context;
pub mod error;
pub mod file_source;
pub mod generator;
pub mod github;
pub mod llm;
pub mod process;
pub mod prompt;
pub mod service;
pub mod sink;
pub mod store;

pub use error::AgentError;
pub use service::PatchService;
