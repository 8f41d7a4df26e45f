//! Reliability-ordered fallback suggestions

use serde::Serialize;
use tracing::debug;

use crate::extract::error::FallbackError;
use crate::extract::schema::{
    ExtractionSchema, Fallback, MarkupLocator, Strategy, StrategyKind, reliability_of,
};

/// Pattern installed on a regex fallback that has none
pub const DEFAULT_FALLBACK_PATTERN: &str = r"(\d+\.\d+(?:\.\d+)?(?:[-._]\w+)?)";

/// Prompt installed on an LLM fallback that has none
pub const DEFAULT_FALLBACK_PROMPT: &str = "Extract the version number from the content";

/// One candidate fallback strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackSuggestion {
    pub strategy: StrategyKind,
    pub reliability: u8,
    pub reason: &'static str,
}

fn rationale(kind: StrategyKind) -> &'static str {
    match kind {
        StrategyKind::Json => "JSON APIs are the most reliable source of version data",
        StrategyKind::Html => "HTML selectors are reliable when the page structure is stable",
        StrategyKind::Regex => "Regex patterns work on any text content but may be fragile",
        StrategyKind::Llm => "LLM extraction is flexible but slow and rate limited",
    }
}

/// All strategies except `primary`, most reliable first
pub fn suggest_fallbacks(primary: StrategyKind) -> Vec<FallbackSuggestion> {
    // ALL is declared in rank order
    StrategyKind::ALL
        .into_iter()
        .filter(|kind| *kind != primary)
        .map(|kind| FallbackSuggestion {
            strategy: kind,
            reliability: kind.rank(),
            reason: rationale(kind),
        })
        .collect()
}

pub fn best_fallback(primary: StrategyKind) -> Option<FallbackSuggestion> {
    suggest_fallbacks(primary).into_iter().next()
}

/// Stable sort of strategy names by reliability; unrecognised names sort last
pub fn order_by_reliability<S: AsRef<str>>(strategies: &mut [S]) {
    strategies.sort_by_key(|name| reliability_of(name.as_ref()));
}

/// Whether `strategies` never moves to a more reliable strategy
pub fn is_fallback_order_valid<S: AsRef<str>>(strategies: &[S]) -> bool {
    strategies
        .windows(2)
        .all(|pair| reliability_of(pair[0].as_ref()) <= reliability_of(pair[1].as_ref()))
}

fn default_strategy(kind: StrategyKind) -> Strategy {
    match kind {
        StrategyKind::Json => Strategy::Json {
            path: String::new(),
        },
        StrategyKind::Html => Strategy::Html {
            locator: MarkupLocator::Css(String::new()),
            pattern: None,
        },
        StrategyKind::Regex => Strategy::Regex {
            pattern: DEFAULT_FALLBACK_PATTERN.to_string(),
        },
        StrategyKind::Llm => Strategy::Llm {
            prompt: Some(DEFAULT_FALLBACK_PROMPT.to_string()),
        },
    }
}

/// Installs the most reliable fallback when the schema has none.
///
/// Returns whether a fallback was added. Json and html fallbacks are added
/// without a locator and must be completed before the schema is well formed.
pub fn enhance_schema_with_fallback(schema: &mut ExtractionSchema) -> bool {
    if schema.fallback.is_some() {
        return false;
    }
    let Some(best) = best_fallback(schema.strategy.kind()) else {
        return false;
    };

    debug!(
        "Adding {} fallback to {} schema for {}",
        best.strategy,
        schema.strategy.kind(),
        schema.url
    );
    schema.fallback = Some(Fallback {
        url: None,
        strategy: default_strategy(best.strategy),
    });
    true
}

/// Most reliable fallback that is usable without a locator.
///
/// Json and html need a path or selector that only the content can tell, so
/// only regex (with the default pattern) and, when a provider exists, llm qualify.
pub fn automatic_fallback(primary: StrategyKind, llm_available: bool) -> Option<Fallback> {
    suggest_fallbacks(primary)
        .into_iter()
        .find(|s| match s.strategy {
            StrategyKind::Regex => true,
            StrategyKind::Llm => llm_available,
            StrategyKind::Json | StrategyKind::Html => false,
        })
        .map(|s| Fallback {
            url: None,
            strategy: default_strategy(s.strategy),
        })
}

/// Checks a primary/fallback pair given by strategy name
pub fn validate_fallback_chain(
    primary: &str,
    fallback: &str,
    fallback_pattern: Option<&str>,
) -> Result<(), FallbackError> {
    if fallback == primary {
        return Err(FallbackError::SameAsPrimary(fallback.to_string()));
    }
    let kind: StrategyKind = fallback
        .parse()
        .map_err(|()| FallbackError::Unrecognized(fallback.to_string()))?;
    if kind == StrategyKind::Regex && fallback_pattern.is_none_or(str::is_empty) {
        return Err(FallbackError::MissingPattern);
    }
    Ok(())
}

/// [`validate_fallback_chain`] applied to a schema; a schema without fallback is valid
pub fn validate_schema_fallback(schema: &ExtractionSchema) -> Result<(), FallbackError> {
    let Some(fallback) = &schema.fallback else {
        return Ok(());
    };
    let pattern = match &fallback.strategy {
        Strategy::Regex { pattern } => Some(pattern.as_str()),
        _ => None,
    };
    validate_fallback_chain(
        schema.strategy.kind().as_str(),
        fallback.strategy.kind().as_str(),
        pattern,
    )
}
