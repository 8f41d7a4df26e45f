//! Version extraction from fetched content
//!
//! # Modules
//!
//! - [`schema`]: Extraction schemas, strategies and reliability ranks
//! - [`engine`]: Strategy dispatch, fallback and history extraction
//! - [`strategies`]: Structured-path, pattern and markup extraction
//! - [`jsonpath`]: Path navigation in JSON documents
//! - [`xpath`]: Path expressions over parsed HTML
//! - [`fallback`]: Reliability-ordered fallback suggestions
//! - [`validator`]: Extracted vs. recorded version comparison
//! - [`normalize`]: Release prefix stripping
//! - [`error`]: Extraction errors

pub mod engine;
pub mod error;
pub mod fallback;
pub mod jsonpath;
pub mod normalize;
pub mod schema;
pub mod strategies;
pub mod validator;
pub mod xpath;

pub use engine::ExtractionEngine;
pub use error::{ExtractionError, FallbackError};
pub use fallback::{
    FallbackSuggestion, automatic_fallback, best_fallback, enhance_schema_with_fallback,
    is_fallback_order_valid, order_by_reliability, suggest_fallbacks, validate_fallback_chain,
    validate_schema_fallback,
};
pub use normalize::{normalize_version, versions_match};
pub use schema::{
    ExtractionSchema, Fallback, HistoryLocator, MarkupLocator, Strategy, StrategyKind,
    reliability_of,
};
pub use validator::{SchemaValidator, ValidationError, ValidationResult};
