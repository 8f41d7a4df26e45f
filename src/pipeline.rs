//! Schema discovery and upstream version checks
//!
//! [`Analyzer::analyze`] finds a working extraction schema for a package:
//! configured schema first, then cached, then discovered sources validated
//! against the version already in the overlay. [`Analyzer::check`] uses that
//! schema to read the upstream version and records newer releases in the
//! pending ledger.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::apply::{PendingStore, PendingUpdate};
use crate::cache::AnalysisCache;
use crate::config::{CHECK_STAGGER_DELAY_MS, ConfigError, PackagesConfig};
use crate::discovery::{DataSource, SourceType, discover_data_sources};
use crate::ebuild::version::{EbuildVersionOrder, VersionComparator};
use crate::ebuild::{EbuildMetadata, MetadataError, MetadataExtractor};
use crate::extract::fallback::automatic_fallback;
use crate::extract::{
    ExtractionEngine, ExtractionError, ExtractionSchema, SchemaValidator, ValidationResult,
    normalize_version,
};
use crate::fetch::{ContentFetcher, FetchError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("{0} only has a live ebuild")]
    LivePackage(String),

    #[error("no working extraction schema found for {0}")]
    NoSchema(String),
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Endpoint tried before any discovered source
    pub url: Option<String>,
    /// Free-form guidance passed to the LLM
    pub hint: String,
    /// Ignore the analysis cache
    pub force: bool,
}

/// One source that was tried during analysis
#[derive(Debug)]
pub struct SourceAttempt {
    pub url: String,
    /// `None` for the `packages.toml` schema
    pub source_type: Option<SourceType>,
    pub schema: Option<ExtractionSchema>,
    pub validation: Option<ValidationResult>,
    /// Why the source was skipped before validation
    pub skipped: Option<String>,
}

impl SourceAttempt {
    fn skipped(source: &DataSource, reason: impl ToString) -> Self {
        Self {
            url: source.url.clone(),
            source_type: Some(source.source_type),
            schema: None,
            validation: None,
            skipped: Some(reason.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct AnalysisReport {
    pub metadata: EbuildMetadata,
    /// The first schema that extracted the overlay's version
    pub schema: Option<ExtractionSchema>,
    pub from_cache: bool,
    pub attempts: Vec<SourceAttempt>,
}

impl AnalysisReport {
    pub fn succeeded(&self) -> bool {
        self.schema.is_some()
    }
}

/// Result of comparing the overlay against upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub package: String,
    pub current_version: String,
    pub upstream_version: String,
    pub source_url: String,
    /// Recent upstream versions, newest first as listed upstream
    pub history: Vec<String>,
    pub update_available: bool,
}

pub struct Analyzer {
    overlay: PathBuf,
    packages: PackagesConfig,
    extractor: MetadataExtractor,
    fetcher: Arc<dyn ContentFetcher>,
    validator: SchemaValidator,
    cache: Arc<AnalysisCache>,
    ledger: Option<Arc<dyn PendingStore>>,
}

impl Analyzer {
    pub fn new(
        overlay: impl Into<PathBuf>,
        fetcher: Arc<dyn ContentFetcher>,
        engine: Arc<ExtractionEngine>,
        cache: Arc<AnalysisCache>,
    ) -> Self {
        Self {
            overlay: overlay.into(),
            packages: PackagesConfig::default(),
            extractor: MetadataExtractor::default(),
            fetcher,
            validator: SchemaValidator::new(engine),
            cache,
            ledger: None,
        }
    }

    pub fn with_packages(mut self, packages: PackagesConfig) -> Self {
        self.packages = packages;
        self
    }

    /// Ledger that receives newer upstream versions found by [`check`](Self::check)
    pub fn with_ledger(mut self, ledger: Arc<dyn PendingStore>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn overlay(&self) -> &Path {
        &self.overlay
    }

    /// Packages with a `packages.toml` entry
    pub fn configured_packages(&self) -> Vec<String> {
        self.packages.packages.keys().cloned().collect()
    }

    fn engine(&self) -> &Arc<ExtractionEngine> {
        self.validator.engine()
    }

    fn metadata(&self, package: &str) -> Result<EbuildMetadata, AnalyzeError> {
        let metadata = self.extractor.extract(&self.overlay, package)?;
        if metadata.is_live {
            return Err(AnalyzeError::LivePackage(package.to_string()));
        }
        Ok(metadata)
    }

    fn configured_schema(&self, package: &str) -> Result<Option<ExtractionSchema>, AnalyzeError> {
        self.packages
            .get(package)
            .map(|config| ExtractionSchema::try_from((package, config)))
            .transpose()
            .map_err(AnalyzeError::from)
    }

    /// Finds a schema that extracts the version currently in the overlay.
    ///
    /// A report without a schema is returned when every source fails; only
    /// setup problems (unknown package, bad configuration, cache errors) are
    /// returned as errors.
    pub async fn analyze(
        &self,
        package: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let metadata = self.metadata(package)?;

        if let Some(entry) = self.cache.get_with_bypass(package, options.force)? {
            debug!("Using cached schema for {} from {}", package, entry.url);
            return Ok(AnalysisReport {
                metadata,
                schema: Some(entry.schema),
                from_cache: true,
                attempts: Vec::new(),
            });
        }

        let mut report = AnalysisReport {
            metadata,
            schema: None,
            from_cache: false,
            attempts: Vec::new(),
        };

        if let Some(schema) = self.configured_schema(package)? {
            let attempt = self.try_configured(schema, &report.metadata.version).await;
            if self.accept(package, &mut report, attempt)? {
                return Ok(report);
            }
        }

        let sources = discover_data_sources(&report.metadata, options.url.as_deref());
        info!("Analyzing {} against {} sources", package, sources.len());

        for source in sources {
            let attempt = self.try_source(&source, &report.metadata, &options.hint).await;
            if self.accept(package, &mut report, attempt)? {
                return Ok(report);
            }
        }

        warn!("No working schema found for {}", package);
        Ok(report)
    }

    /// Records the attempt, caching its schema when it validated
    fn accept(
        &self,
        package: &str,
        report: &mut AnalysisReport,
        attempt: SourceAttempt,
    ) -> Result<bool, AnalyzeError> {
        let valid = attempt.validation.as_ref().is_some_and(|v| v.valid);
        if valid && let Some(schema) = &attempt.schema {
            self.cache.set(package, schema, &attempt.url)?;
            info!("Found schema for {} at {}", package, attempt.url);
            report.schema = Some(schema.clone());
        }
        report.attempts.push(attempt);
        Ok(valid)
    }

    async fn try_configured(&self, schema: ExtractionSchema, recorded: &str) -> SourceAttempt {
        let mut attempt = SourceAttempt {
            url: schema.url.clone(),
            source_type: None,
            schema: None,
            validation: None,
            skipped: None,
        };

        let primary = match self.fetcher.fetch(&schema.url, &schema.headers).await {
            Ok(content) => content.body,
            Err(e) => {
                attempt.skipped = Some(e.to_string());
                return attempt;
            }
        };

        let fallback_content = match schema.fallback.as_ref().and_then(|f| f.url.as_deref()) {
            Some(url) => self
                .fetcher
                .fetch(url, &schema.headers)
                .await
                .inspect_err(|e| warn!("Failed to fetch fallback {}: {}", url, e))
                .ok()
                .map(|content| content.body),
            None => None,
        };

        let validation = self
            .validator
            .validate_schema_with_fallback(&primary, fallback_content.as_deref(), &schema, recorded)
            .await;
        attempt.schema = Some(schema);
        attempt.validation = Some(validation);
        attempt
    }

    async fn try_source(
        &self,
        source: &DataSource,
        metadata: &EbuildMetadata,
        hint: &str,
    ) -> SourceAttempt {
        debug!("Trying {} source {}", source.source_type, source.url);

        let content = match self.fetcher.fetch(&source.url, &BTreeMap::new()).await {
            Ok(content) => content.body,
            Err(e) => return SourceAttempt::skipped(source, e),
        };

        let schema = match source.default_schema() {
            Some(schema) => schema,
            None => match self.suggest_schema(source, &content, metadata, hint).await {
                Ok(schema) => schema,
                Err(e) => return SourceAttempt::skipped(source, e),
            },
        };
        let schema = self.with_automatic_fallback(schema);

        let validation = self
            .validator
            .validate_schema(&content, &schema, &metadata.version)
            .await;

        SourceAttempt {
            url: source.url.clone(),
            source_type: Some(source.source_type),
            schema: Some(schema),
            validation: Some(validation),
            skipped: None,
        }
    }

    async fn suggest_schema(
        &self,
        source: &DataSource,
        content: &[u8],
        metadata: &EbuildMetadata,
        hint: &str,
    ) -> Result<ExtractionSchema, ExtractionError> {
        let analysis = self
            .engine()
            .analyze_content(content, metadata, hint)
            .await?;
        debug!(
            "LLM suggested {} parser for {} (confidence {:.2}): {}",
            analysis.parser_type, source.url, analysis.confidence, analysis.reasoning
        );
        Ok(analysis.into_schema(&source.url)?)
    }

    fn with_automatic_fallback(&self, mut schema: ExtractionSchema) -> ExtractionSchema {
        if schema.fallback.is_none() {
            schema.fallback = automatic_fallback(schema.strategy.kind(), self.engine().has_llm());
        }
        schema
    }

    /// Schema used by [`check`](Self::check): configured, then cached, then analyzed
    async fn schema_for_check(
        &self,
        package: &str,
        options: &AnalyzeOptions,
    ) -> Result<ExtractionSchema, AnalyzeError> {
        if let Some(schema) = self.configured_schema(package)? {
            return Ok(schema);
        }
        if !options.force
            && let Some(entry) = self.cache.get(package)?
        {
            return Ok(entry.schema);
        }
        self.analyze(package, options)
            .await?
            .schema
            .ok_or_else(|| AnalyzeError::NoSchema(package.to_string()))
    }

    /// Reads the upstream version and records it when newer than the overlay's
    pub async fn check(
        &self,
        package: &str,
        options: &AnalyzeOptions,
    ) -> Result<CheckOutcome, AnalyzeError> {
        let metadata = self.metadata(package)?;
        let schema = self.schema_for_check(package, options).await?;

        let content = self.fetcher.fetch(&schema.url, &schema.headers).await?;
        let (upstream, source_url) = match self
            .engine()
            .extract_with_fallback(&content.body, &schema)
            .await
        {
            Ok(version) => (version, schema.url.clone()),
            Err(e) => self.extract_from_fallback_url(&schema, e).await?,
        };

        let history = match &schema.history {
            Some(locator) => self
                .engine()
                .extract_history(&content.body, locator)
                .inspect_err(|e| warn!("Failed to read version history for {}: {}", package, e))
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let upstream_version = normalize_version(&upstream).to_string();
        let current_version = metadata.version;
        let update_available = EbuildVersionOrder
            .compare(&upstream_version, normalize_version(&current_version))
            == Ordering::Greater;

        if update_available {
            info!(
                "{}: {} -> {} available",
                package, current_version, upstream_version
            );
            if let Some(ledger) = &self.ledger {
                ledger.add(
                    PendingUpdate::new(package, &current_version, &upstream_version)
                        .with_source_url(&source_url),
                )?;
            }
        } else {
            debug!("{} is up to date at {}", package, current_version);
        }

        Ok(CheckOutcome {
            package: package.to_string(),
            current_version,
            upstream_version,
            source_url,
            history,
            update_available,
        })
    }

    /// Retries on the fallback endpoint when it differs from the primary one
    async fn extract_from_fallback_url(
        &self,
        schema: &ExtractionSchema,
        primary_error: ExtractionError,
    ) -> Result<(String, String), AnalyzeError> {
        let fallback = match schema.fallback_schema() {
            Some(fallback) if fallback.url != schema.url => fallback,
            _ => return Err(primary_error.into()),
        };

        debug!("Primary extraction failed, trying {}", fallback.url);
        let content = self.fetcher.fetch(&fallback.url, &fallback.headers).await?;
        match self.engine().extract(&content.body, &fallback.strategy).await {
            Ok(version) => Ok((version, fallback.url)),
            Err(e) => {
                warn!("Fallback extraction from {} failed: {}", fallback.url, e);
                Err(primary_error.into())
            }
        }
    }

    /// Checks every package concurrently with staggered start times
    pub async fn check_all(
        &self,
        packages: &[String],
        options: &AnalyzeOptions,
    ) -> Vec<(String, Result<CheckOutcome, AnalyzeError>)> {
        let futures = packages.iter().enumerate().map(|(i, package)| {
            let delay = Duration::from_millis(CHECK_STAGGER_DELAY_MS * i as u64);
            async move {
                tokio::time::sleep(delay).await;
                let result = self
                    .check(package, options)
                    .await
                    .inspect_err(|e| error!("Failed to check {}: {}", package, e));
                (package.clone(), result)
            }
        });

        join_all(futures).await
    }
}
