use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Time-related constants
// =============================================================================

/// How long a validated schema stays in the analysis cache (24 hours)
pub const ANALYSIS_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Refill interval of the global LLM bucket (5 requests per minute)
pub const LLM_REFILL_INTERVAL: Duration = Duration::from_secs(12);

/// Refill interval of each per-host HTTP bucket (10 requests per minute)
pub const HTTP_REFILL_INTERVAL: Duration = Duration::from_secs(6);

/// Timeout for a single upstream fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between starting each package check in a batch
pub const CHECK_STAGGER_DELAY_MS: u64 = 10;

// =============================================================================
// Extraction limits
// =============================================================================

/// Maximum number of versions returned by history extraction
pub const MAX_VERSION_HISTORY: usize = 10;

/// Content longer than this is truncated before it is sent to an LLM
pub const MAX_LLM_CONTENT_CHARS: usize = 4000;

/// Location of the schema configuration inside an overlay
const PACKAGES_CONFIG_RELATIVE: &str = ".autoupdate/packages.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("packages.toml not found at {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("package {package}: missing required field: {field}")]
    MissingField {
        package: String,
        field: &'static str,
    },

    #[error("package {package}: invalid parser type {parser:?}: must be 'json', 'regex', or 'html'")]
    InvalidParser { package: String, parser: String },

    #[error("package {package}: invalid fallback_parser type {parser:?}")]
    InvalidFallbackParser { package: String, parser: String },

    #[error("package {package}: fallback_parser must differ from parser")]
    FallbackSameAsPrimary { package: String },
}

/// Per-package extraction configuration from `packages.toml`.
///
/// Each `[category/name]` table maps onto one of these. Field names follow the
/// on-disk keys so existing overlay configurations load unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PackageConfig {
    pub url: String,
    pub parser: String,
    pub path: Option<String>,
    pub pattern: Option<String>,
    pub selector: Option<String>,
    pub xpath: Option<String>,
    pub binary: bool,
    pub fallback_url: Option<String>,
    pub fallback_parser: Option<String>,
    pub fallback_pattern: Option<String>,
    pub llm_prompt: Option<String>,
    pub headers: HashMap<String, String>,
    pub versions_path: Option<String>,
    pub versions_selector: Option<String>,
    pub versions_xpath: Option<String>,
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl PackageConfig {
    /// Checks required fields for the primary parser and, when present, the fallback parser.
    pub fn validate(&self, package: &str) -> Result<(), ConfigError> {
        let missing = |field| ConfigError::MissingField {
            package: package.to_string(),
            field,
        };

        if self.url.is_empty() {
            return Err(missing("url"));
        }
        if self.parser.is_empty() {
            return Err(missing("parser"));
        }

        match self.parser.as_str() {
            "json" if !non_empty(&self.path) => return Err(missing("path")),
            "regex" if !non_empty(&self.pattern) => return Err(missing("pattern")),
            "html" if !non_empty(&self.selector) && !non_empty(&self.xpath) => {
                return Err(missing("selector or xpath"));
            }
            "json" | "regex" | "html" => {}
            other => {
                return Err(ConfigError::InvalidParser {
                    package: package.to_string(),
                    parser: other.to_string(),
                });
            }
        }

        let Some(fallback) = self.fallback_parser.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        if fallback == self.parser {
            return Err(ConfigError::FallbackSameAsPrimary {
                package: package.to_string(),
            });
        }

        match fallback {
            "regex" if !non_empty(&self.fallback_pattern) => Err(missing("fallback_pattern")),
            "json" if !non_empty(&self.path) => Err(missing("path")),
            "html" if !non_empty(&self.selector) && !non_empty(&self.xpath) => {
                Err(missing("selector or xpath"))
            }
            "json" | "regex" | "html" | "llm" => Ok(()),
            other => Err(ConfigError::InvalidFallbackParser {
                package: package.to_string(),
                parser: other.to_string(),
            }),
        }
    }

    /// Whether a version-history locator is configured
    pub fn has_version_history(&self) -> bool {
        non_empty(&self.versions_path)
            || non_empty(&self.versions_selector)
            || non_empty(&self.versions_xpath)
    }
}

/// All package configurations of one overlay, keyed by `category/name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PackagesConfig {
    pub packages: BTreeMap<String, PackageConfig>,
}

impl PackagesConfig {
    /// Loads `.autoupdate/packages.toml` from the overlay root.
    pub fn load(overlay: &Path) -> Result<Self, ConfigError> {
        let path = overlay.join(PACKAGES_CONFIG_RELATIVE);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        Self::parse(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn get(&self, package: &str) -> Option<&PackageConfig> {
        self.packages.get(package)
    }

    /// Validates every package, returning the first error in key order.
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.packages
            .iter()
            .try_for_each(|(package, cfg)| cfg.validate(package))
    }
}

/// LLM provider configuration (`llm.toml` in the data directory)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `claude`, `openai` or `ollama`; empty means AI-assisted extraction is disabled
    pub provider: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Loads the LLM configuration, returning the default (disabled) config when absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Returns the path to the data directory for ebuild-autoupdate.
/// Uses $XDG_DATA_HOME/ebuild-autoupdate if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/ebuild-autoupdate,
/// or ./ebuild-autoupdate if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the database file (analysis cache and pending ledger).
pub fn db_path() -> PathBuf {
    data_dir().join("autoupdate.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("ebuild-autoupdate.log")
}

/// Returns the directory where failed build probes write their output.
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn llm_config_path() -> PathBuf {
    data_dir().join("llm.toml")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("ebuild-autoupdate")
}
