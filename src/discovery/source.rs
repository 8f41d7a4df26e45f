//! Candidate endpoint types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::extract::schema::{ExtractionSchema, HistoryLocator, Strategy};

pub const PRIORITY_PROVIDED: u32 = 0;
pub const PRIORITY_GITHUB: u32 = 10;
pub const PRIORITY_REGISTRY: u32 = 20;
pub const PRIORITY_HOMEPAGE: u32 = 100;

/// Where a candidate endpoint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Explicit URL supplied by the caller
    Provided,
    /// GitHub releases API
    GitHub,
    PyPI,
    Npm,
    Crates,
    /// The recipe's HOMEPAGE
    Homepage,
}

impl SourceType {
    /// Returns the string representation of the source type
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Provided => "provided",
            SourceType::GitHub => "github",
            SourceType::PyPI => "pypi",
            SourceType::Npm => "npm",
            SourceType::Crates => "crates",
            SourceType::Homepage => "homepage",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provided" => Ok(SourceType::Provided),
            "github" => Ok(SourceType::GitHub),
            "pypi" => Ok(SourceType::PyPI),
            "npm" => Ok(SourceType::Npm),
            "crates" => Ok(SourceType::Crates),
            "homepage" => Ok(SourceType::Homepage),
            _ => Err(()),
        }
    }
}

/// Expected payload of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Html,
}

impl ContentType {
    /// Guesses the payload type from well-known API URL shapes
    pub fn detect(url: &str) -> Self {
        const JSON_PATTERNS: &[&str] = &[
            "api.github.com",
            "pypi.org/pypi/",
            "registry.npmjs.org",
            "crates.io/api/",
            ".json",
        ];

        if JSON_PATTERNS.iter().any(|p| url.contains(p)) {
            ContentType::Json
        } else {
            ContentType::Html
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Html => "text/html",
        }
    }
}

/// A candidate version-check endpoint. Lower priority is tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub url: String,
    pub source_type: SourceType,
    pub priority: u32,
    pub content_type: ContentType,
}

impl DataSource {
    pub fn new(url: impl Into<String>, source_type: SourceType, priority: u32) -> Self {
        let url = url.into();
        let content_type = ContentType::detect(&url);
        Self {
            url,
            source_type,
            priority,
            content_type,
        }
    }

    /// Well-known extraction schema for registry endpoints.
    ///
    /// Returns `None` for provided and homepage sources, whose layout is unknown.
    pub fn default_schema(&self) -> Option<ExtractionSchema> {
        let (path, history) = match self.source_type {
            SourceType::GitHub => ("[0].tag_name", Some("[*].tag_name")),
            SourceType::PyPI => ("info.version", None),
            SourceType::Npm => ("dist-tags.latest", None),
            SourceType::Crates => ("crate.max_stable_version", Some("versions[*].num")),
            SourceType::Provided | SourceType::Homepage => return None,
        };

        let mut schema = ExtractionSchema::new(
            self.url.clone(),
            Strategy::Json {
                path: path.to_string(),
            },
        );
        schema.history = history.map(|p| HistoryLocator::Json(p.to_string()));
        Some(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://api.github.com/repos/psf/requests/releases", ContentType::Json)]
    #[case("https://pypi.org/pypi/requests/json", ContentType::Json)]
    #[case("https://registry.npmjs.org/left-pad", ContentType::Json)]
    #[case("https://crates.io/api/v1/crates/serde", ContentType::Json)]
    #[case("https://example.com/latest.json", ContentType::Json)]
    #[case("https://example.com/downloads", ContentType::Html)]
    fn content_type_detect_recognises_api_urls(#[case] url: &str, #[case] expected: ContentType) {
        assert_eq!(ContentType::detect(url), expected);
    }

    #[rstest]
    #[case(SourceType::Provided)]
    #[case(SourceType::GitHub)]
    #[case(SourceType::PyPI)]
    #[case(SourceType::Npm)]
    #[case(SourceType::Crates)]
    #[case(SourceType::Homepage)]
    fn source_type_string_form_parses_back(#[case] source_type: SourceType) {
        assert_eq!(source_type.as_str().parse::<SourceType>(), Ok(source_type));
    }

    #[test]
    fn default_schema_for_github_reads_first_tag() {
        let source = DataSource::new(
            "https://api.github.com/repos/o/r/releases",
            SourceType::GitHub,
            PRIORITY_GITHUB,
        );

        let schema = source.default_schema().unwrap();

        assert_eq!(
            schema.strategy,
            Strategy::Json {
                path: "[0].tag_name".to_string()
            }
        );
        assert_eq!(
            schema.history,
            Some(HistoryLocator::Json("[*].tag_name".to_string()))
        );
    }

    #[test]
    fn default_schema_is_none_for_homepage() {
        let source = DataSource::new("https://example.com", SourceType::Homepage, PRIORITY_HOMEPAGE);

        assert_eq!(source.default_schema(), None);
    }
}
