//! Checks that a schema extracts the version recorded in the overlay

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::extract::engine::ExtractionEngine;
use crate::extract::error::ExtractionError;
use crate::extract::normalize::normalize_version;
use crate::extract::schema::ExtractionSchema;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    #[error("version mismatch: extracted {extracted:?}, expected {expected:?}")]
    VersionMismatch { extracted: String, expected: String },
}

/// Outcome of testing one schema against fetched content
#[derive(Debug)]
pub struct ValidationResult {
    /// Empty when extraction failed
    pub extracted_version: String,
    pub recorded_version: String,
    pub versions_match: bool,
    /// Extraction succeeded and the normalized versions are equal
    pub valid: bool,
    pub error: Option<ValidationError>,
}

impl ValidationResult {
    fn extraction_failed(recorded: &str, err: ExtractionError) -> Self {
        Self {
            extracted_version: String::new(),
            recorded_version: recorded.to_string(),
            versions_match: false,
            valid: false,
            error: Some(ValidationError::ExtractionFailed(err)),
        }
    }

    fn compared(extracted: String, recorded: &str) -> Self {
        let versions_match = normalize_version(&extracted) == normalize_version(recorded);
        let error = (!versions_match).then(|| ValidationError::VersionMismatch {
            extracted: extracted.clone(),
            expected: recorded.to_string(),
        });
        Self {
            extracted_version: extracted,
            recorded_version: recorded.to_string(),
            versions_match,
            valid: versions_match,
            error,
        }
    }
}

pub struct SchemaValidator {
    engine: Arc<ExtractionEngine>,
}

impl SchemaValidator {
    pub fn new(engine: Arc<ExtractionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<ExtractionEngine> {
        &self.engine
    }

    /// Extracts with the schema (and its fallback strategy) and compares against `recorded`
    pub async fn validate_schema(
        &self,
        content: &[u8],
        schema: &ExtractionSchema,
        recorded: &str,
    ) -> ValidationResult {
        let result = match self.engine.extract_with_fallback(content, schema).await {
            Ok(extracted) => ValidationResult::compared(extracted, recorded),
            Err(err) => ValidationResult::extraction_failed(recorded, err),
        };

        match &result.error {
            None => info!(
                "Schema for {} validated: extracted {}",
                schema.url, result.extracted_version
            ),
            Some(err) => debug!("Schema for {} rejected: {}", schema.url, err),
        }
        result
    }

    /// Like [`validate_schema`](Self::validate_schema), retrying against the
    /// fallback endpoint's content when the primary attempt is not valid.
    ///
    /// The retry only happens when both `fallback_content` and a fallback
    /// strategy exist. Returns the first valid result, otherwise the primary one.
    pub async fn validate_schema_with_fallback(
        &self,
        primary_content: &[u8],
        fallback_content: Option<&[u8]>,
        schema: &ExtractionSchema,
        recorded: &str,
    ) -> ValidationResult {
        let primary = self.validate_schema(primary_content, schema, recorded).await;
        if primary.valid {
            return primary;
        }

        let (Some(content), Some(fallback_schema)) = (fallback_content, schema.fallback_schema())
        else {
            return primary;
        };

        debug!(
            "Retrying validation with {} fallback against {}",
            fallback_schema.strategy.kind(),
            fallback_schema.url
        );
        let fallback = self.validate_schema(content, &fallback_schema, recorded).await;
        if fallback.valid { fallback } else { primary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::schema::{Fallback, Strategy};
    use crate::ratelimit::RateLimiter;
    use rstest::rstest;

    fn validator() -> SchemaValidator {
        SchemaValidator::new(Arc::new(ExtractionEngine::new(Arc::new(RateLimiter::new()))))
    }

    fn json_schema(path: &str) -> ExtractionSchema {
        ExtractionSchema::new(
            "https://example.com/api",
            Strategy::Json {
                path: path.to_string(),
            },
        )
    }

    #[rstest]
    #[case("1.2.3")]
    #[case("2024.01.15")]
    #[case("0.9.0_beta2")]
    #[tokio::test]
    async fn validate_schema_accepts_round_tripped_version(#[case] version: &str) {
        let content = serde_json::to_vec(&serde_json::json!({ "version": version })).unwrap();

        let result = validator()
            .validate_schema(&content, &json_schema("version"), version)
            .await;

        assert_eq!(result.extracted_version, version);
        assert!(result.versions_match);
        assert!(result.valid);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn validate_schema_reports_mismatch() {
        let result = validator()
            .validate_schema(br#"{"version": "1.2.4"}"#, &json_schema("version"), "1.2.3")
            .await;

        assert!(!result.valid);
        assert!(!result.versions_match);
        assert_eq!(result.extracted_version, "1.2.4");
        let err = result.error.unwrap();
        assert!(err.to_string().contains("version mismatch"));
        assert!(matches!(
            err,
            ValidationError::VersionMismatch { extracted, expected }
                if extracted == "1.2.4" && expected == "1.2.3"
        ));
    }

    #[rstest]
    #[case("v1.2.3", "1.2.3")]
    #[case("release-1.2.3", "1.2.3")]
    #[case("1.2.3", "V1.2.3")]
    #[tokio::test]
    async fn validate_schema_ignores_release_prefixes(#[case] upstream: &str, #[case] recorded: &str) {
        let content = serde_json::to_vec(&serde_json::json!({ "tag": upstream })).unwrap();

        let result = validator()
            .validate_schema(&content, &json_schema("tag"), recorded)
            .await;

        assert!(result.valid);
    }

    #[tokio::test]
    async fn validate_schema_reports_extraction_failure_with_empty_version() {
        let result = validator()
            .validate_schema(b"not json", &json_schema("version"), "1.0")
            .await;

        assert!(!result.valid);
        assert_eq!(result.extracted_version, "");
        assert_eq!(result.recorded_version, "1.0");
        assert!(matches!(
            result.error,
            Some(ValidationError::ExtractionFailed(ExtractionError::InvalidJson(_)))
        ));
    }

    #[tokio::test]
    async fn validate_schema_regex_scenario() {
        let schema = ExtractionSchema::new(
            "https://example.com/PKGBUILD",
            Strategy::Regex {
                pattern: "pkgver=([0-9.]+)".to_string(),
            },
        );

        let result = validator()
            .validate_schema(b"pkgver=3.1.4", &schema, "3.1.4")
            .await;

        assert!(result.valid);
    }

    fn schema_with_regex_fallback() -> ExtractionSchema {
        json_schema("version").with_fallback(Fallback {
            url: Some("https://example.com/changelog".to_string()),
            strategy: Strategy::Regex {
                pattern: r"Release (\d+\.\d+\.\d+)".to_string(),
            },
        })
    }

    #[tokio::test]
    async fn validate_with_fallback_retries_on_fallback_content() {
        let result = validator()
            .validate_schema_with_fallback(
                br#"{"version": "0.0.1"}"#,
                Some(b"Release 2.0.0 is out".as_slice()),
                &schema_with_regex_fallback(),
                "2.0.0",
            )
            .await;

        assert!(result.valid);
        assert_eq!(result.extracted_version, "2.0.0");
    }

    #[tokio::test]
    async fn validate_with_fallback_returns_primary_when_both_fail() {
        let result = validator()
            .validate_schema_with_fallback(
                br#"{"version": "0.0.1"}"#,
                Some(b"nothing".as_slice()),
                &schema_with_regex_fallback(),
                "2.0.0",
            )
            .await;

        assert!(!result.valid);
        assert_eq!(result.extracted_version, "0.0.1");
        assert!(matches!(
            result.error,
            Some(ValidationError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn validate_with_fallback_skips_retry_without_fallback_content() {
        let result = validator()
            .validate_schema_with_fallback(
                br#"{"version": "0.0.1"}"#,
                None,
                &schema_with_regex_fallback(),
                "2.0.0",
            )
            .await;

        assert_eq!(result.extracted_version, "0.0.1");
        assert!(!result.valid);
    }
}
