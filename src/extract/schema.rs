//! Declarative extraction schemas

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, PackageConfig};

/// Element locator for markup content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupLocator {
    Css(String),
    XPath(String),
}

impl MarkupLocator {
    pub fn expression(&self) -> &str {
        match self {
            MarkupLocator::Css(s) | MarkupLocator::XPath(s) => s,
        }
    }
}

/// How a version is extracted from fetched content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Strategy {
    /// Structured path into a JSON document (`info.version`, `[0].tag_name`)
    Json { path: String },
    /// First capture group of a regular expression
    Regex { pattern: String },
    /// Text of the first element matched by a CSS selector or XPath expression,
    /// optionally refined by a pattern
    Html {
        locator: MarkupLocator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    /// Remote model extraction with an optional instruction
    Llm {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Json { .. } => StrategyKind::Json,
            Strategy::Regex { .. } => StrategyKind::Regex,
            Strategy::Html { .. } => StrategyKind::Html,
            Strategy::Llm { .. } => StrategyKind::Llm,
        }
    }

    /// Whether the locator the strategy needs is present
    pub fn has_locator(&self) -> bool {
        match self {
            Strategy::Json { path } => !path.is_empty(),
            Strategy::Regex { pattern } => !pattern.is_empty(),
            Strategy::Html { locator, .. } => !locator.expression().is_empty(),
            Strategy::Llm { .. } => true,
        }
    }
}

/// Strategy identifier, ordered by reliability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Json,
    Html,
    Regex,
    Llm,
}

/// Rank given to strategy names that are not recognised
pub const UNKNOWN_RELIABILITY: u8 = 5;

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Json,
        StrategyKind::Html,
        StrategyKind::Regex,
        StrategyKind::Llm,
    ];

    /// Reliability rank; lower is more reliable
    pub fn rank(&self) -> u8 {
        match self {
            StrategyKind::Json => 1,
            StrategyKind::Html => 2,
            StrategyKind::Regex => 3,
            StrategyKind::Llm => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Json => "json",
            StrategyKind::Html => "html",
            StrategyKind::Regex => "regex",
            StrategyKind::Llm => "llm",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(StrategyKind::Json),
            "html" => Ok(StrategyKind::Html),
            "regex" => Ok(StrategyKind::Regex),
            "llm" => Ok(StrategyKind::Llm),
            _ => Err(()),
        }
    }
}

/// Reliability rank of a strategy name, `UNKNOWN_RELIABILITY` when unrecognised
pub fn reliability_of(name: &str) -> u8 {
    name.parse::<StrategyKind>()
        .map_or(UNKNOWN_RELIABILITY, |kind| kind.rank())
}

/// Second strategy tried when the primary one fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback {
    /// Alternate endpoint; `None` reuses the primary URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub strategy: Strategy,
}

/// Locator for a bounded list of recent versions. Markup variants carry an
/// optional pattern whose first capture group refines each matched text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryLocator {
    Json(String),
    Css {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    XPath {
        expression: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
}

/// How to obtain a package's upstream version from one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub url: String,
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryLocator>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub binary: bool,
}

impl ExtractionSchema {
    pub fn new(url: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            url: url.into(),
            strategy,
            fallback: None,
            history: None,
            headers: BTreeMap::new(),
            binary: false,
        }
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Checks that each strategy has its locator and the fallback differs from the primary
    pub fn is_well_formed(&self) -> bool {
        if !self.strategy.has_locator() {
            return false;
        }
        match &self.fallback {
            Some(fallback) => {
                fallback.strategy.kind() != self.strategy.kind() && fallback.strategy.has_locator()
            }
            None => true,
        }
    }

    /// Schema that uses the fallback as its only strategy
    pub fn fallback_schema(&self) -> Option<ExtractionSchema> {
        let fallback = self.fallback.as_ref()?;
        Some(ExtractionSchema {
            url: fallback.url.clone().unwrap_or_else(|| self.url.clone()),
            strategy: fallback.strategy.clone(),
            fallback: None,
            history: None,
            headers: self.headers.clone(),
            binary: self.binary,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn markup_locator(config: &PackageConfig) -> Option<MarkupLocator> {
    non_empty(&config.selector)
        .map(MarkupLocator::Css)
        .or_else(|| non_empty(&config.xpath).map(MarkupLocator::XPath))
}

impl TryFrom<(&str, &PackageConfig)> for ExtractionSchema {
    type Error = ConfigError;

    /// Converts a validated `packages.toml` entry. The tuple's first element is
    /// the package id used in error messages.
    fn try_from((package, config): (&str, &PackageConfig)) -> Result<Self, Self::Error> {
        config.validate(package)?;

        let invalid = || ConfigError::InvalidParser {
            package: package.to_string(),
            parser: config.parser.clone(),
        };

        let strategy = match config.parser.as_str() {
            "json" => Strategy::Json {
                path: non_empty(&config.path).ok_or_else(invalid)?,
            },
            "regex" => Strategy::Regex {
                pattern: non_empty(&config.pattern).ok_or_else(invalid)?,
            },
            "html" => Strategy::Html {
                locator: markup_locator(config).ok_or_else(invalid)?,
                pattern: non_empty(&config.pattern),
            },
            _ => return Err(invalid()),
        };

        let fallback_strategy = match non_empty(&config.fallback_parser).as_deref() {
            Some("json") => non_empty(&config.path).map(|path| Strategy::Json { path }),
            Some("regex") => {
                non_empty(&config.fallback_pattern).map(|pattern| Strategy::Regex { pattern })
            }
            Some("html") => markup_locator(config).map(|locator| Strategy::Html {
                locator,
                pattern: non_empty(&config.fallback_pattern),
            }),
            Some("llm") => Some(Strategy::Llm {
                prompt: non_empty(&config.llm_prompt),
            }),
            // An LLM prompt alone enables AI-assisted extraction as the fallback.
            _ => non_empty(&config.llm_prompt).map(|prompt| Strategy::Llm {
                prompt: Some(prompt),
            }),
        };

        let history = config.has_version_history().then(|| history_locator(config)).flatten();

        Ok(ExtractionSchema {
            url: config.url.clone(),
            strategy,
            fallback: fallback_strategy.map(|strategy| Fallback {
                url: non_empty(&config.fallback_url),
                strategy,
            }),
            history,
            headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            binary: config.binary,
        })
    }
}

fn history_locator(config: &PackageConfig) -> Option<HistoryLocator> {
    let pattern = non_empty(&config.pattern);
    non_empty(&config.versions_path)
        .map(HistoryLocator::Json)
        .or_else(|| {
            non_empty(&config.versions_selector).map(|selector| HistoryLocator::Css {
                selector,
                pattern: pattern.clone(),
            })
        })
        .or_else(|| {
            non_empty(&config.versions_xpath).map(|expression| HistoryLocator::XPath {
                expression,
                pattern,
            })
        })
}
