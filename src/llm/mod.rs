//! AI-assisted extraction backends
//!
//! # Modules
//!
//! - [`provider`]: `LlmProvider` capability, schema suggestions, provider selection
//! - [`prompt`]: Prompt building and reply cleaning
//! - [`claude`], [`openai`], [`ollama`]: HTTP backends
//! - [`error`]: LLM errors

pub mod claude;
pub mod error;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod provider;

pub use error::LlmError;
pub use provider::{LlmProvider, SchemaAnalysis, provider_from_config};
