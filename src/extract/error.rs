use thiserror::Error;

use crate::llm::LlmError;
use crate::ratelimit::RateLimitError;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Invalid JSON content: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid JSON path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("JSON path {0:?} did not resolve to a version")]
    PathNotFound(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Pattern {0:?} did not match")]
    NoMatch(String),

    #[error("Pattern {0:?} has no capture group")]
    NoCaptureGroup(String),

    #[error("Invalid CSS selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid XPath expression {xpath:?}: {reason}")]
    InvalidXPath { xpath: String, reason: String },

    #[error("No element matched {0:?}")]
    NoElements(String),

    #[error("No versions found")]
    NoVersions,

    #[error("No LLM provider configured")]
    LlmNotConfigured,

    #[error("LLM extraction failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Rate limit: {0}")]
    RateLimit(#[from] RateLimitError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
    #[error("fallback strategy {0:?} is the same as the primary strategy")]
    SameAsPrimary(String),

    #[error("unrecognized fallback strategy {0:?}")]
    Unrecognized(String),

    #[error("regex fallback requires a pattern")]
    MissingPattern,
}
