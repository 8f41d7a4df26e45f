//! Strategy dispatch, including the rate-limited AI-assisted path

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ebuild::EbuildMetadata;
use crate::extract::error::ExtractionError;
use crate::extract::schema::{ExtractionSchema, HistoryLocator, Strategy};
use crate::extract::strategies::{extract_history, extract_html, extract_json, extract_regex};
use crate::llm::{LlmProvider, SchemaAnalysis};
use crate::ratelimit::RateLimiter;

/// Extracts versions from fetched content.
///
/// Structured-path, pattern and markup strategies run locally. The AI-assisted
/// strategy waits on the limiter's global LLM bucket before each call and fails
/// with [`ExtractionError::LlmNotConfigured`] when no provider was supplied.
pub struct ExtractionEngine {
    limiter: Arc<RateLimiter>,
    llm: Option<Arc<dyn LlmProvider>>,
    cancel: CancellationToken,
}

impl ExtractionEngine {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            llm: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_llm(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(provider);
        self
    }

    /// Token observed by rate limiter waits on the AI-assisted path
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub fn llm(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.llm.as_ref()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Extracts a single trimmed version using `strategy`
    pub async fn extract(
        &self,
        content: &[u8],
        strategy: &Strategy,
    ) -> Result<String, ExtractionError> {
        let version = match strategy {
            Strategy::Json { path } => extract_json(&String::from_utf8_lossy(content), path)?,
            Strategy::Regex { pattern } => {
                extract_regex(&String::from_utf8_lossy(content), pattern)?
            }
            Strategy::Html { locator, pattern } => extract_html(
                &String::from_utf8_lossy(content),
                locator,
                pattern.as_deref(),
            )?,
            Strategy::Llm { prompt } => {
                self.extract_with_llm(content, prompt.as_deref().unwrap_or_default())
                    .await?
            }
        };

        let version = version.trim();
        if version.is_empty() {
            return Err(ExtractionError::NoVersions);
        }
        debug!("Extracted version {} using {} strategy", version, strategy.kind());
        Ok(version.to_string())
    }

    async fn extract_with_llm(&self, content: &[u8], prompt: &str) -> Result<String, ExtractionError> {
        let provider = self.llm.as_ref().ok_or(ExtractionError::LlmNotConfigured)?;
        self.limiter.wait_llm(&self.cancel).await?;
        debug!("Extracting version with model {}", provider.model());
        Ok(provider.extract_version(content, prompt).await?)
    }

    /// Asks the model for an extraction approach, under the same LLM budget as extraction
    pub async fn analyze_content(
        &self,
        content: &[u8],
        meta: &EbuildMetadata,
        hint: &str,
    ) -> Result<SchemaAnalysis, ExtractionError> {
        let provider = self.llm.as_ref().ok_or(ExtractionError::LlmNotConfigured)?;
        self.limiter.wait_llm(&self.cancel).await?;
        debug!("Analyzing content for {} with model {}", meta.package, provider.model());
        Ok(provider.analyze_content(content, meta, hint).await?)
    }

    /// Tries the primary strategy, then the fallback strategy on the same content.
    ///
    /// When both fail the primary error is returned.
    pub async fn extract_with_fallback(
        &self,
        content: &[u8],
        schema: &ExtractionSchema,
    ) -> Result<String, ExtractionError> {
        let primary_err = match self.extract(content, &schema.strategy).await {
            Ok(version) => return Ok(version),
            Err(e) => e,
        };

        let Some(fallback) = &schema.fallback else {
            return Err(primary_err);
        };

        warn!(
            "Primary {} extraction failed ({}), trying {} fallback",
            schema.strategy.kind(),
            primary_err,
            fallback.strategy.kind()
        );
        match self.extract(content, &fallback.strategy).await {
            Ok(version) => Ok(version),
            Err(fallback_err) => {
                debug!("Fallback extraction failed: {}", fallback_err);
                Err(primary_err)
            }
        }
    }

    /// Up to ten recent versions in source order
    pub fn extract_history(
        &self,
        content: &[u8],
        locator: &HistoryLocator,
    ) -> Result<Vec<String>, ExtractionError> {
        extract_history(&String::from_utf8_lossy(content), locator)
    }
}
