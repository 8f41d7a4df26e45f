//! LLM provider capability and provider selection

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::LlmConfig;
use crate::ebuild::EbuildMetadata;
use crate::extract::schema::{ExtractionSchema, Fallback, MarkupLocator, Strategy};
use crate::llm::claude::ClaudeProvider;
use crate::llm::error::LlmError;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAiProvider;

/// Remote model used for version extraction and schema suggestions
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Asks the model for the single version contained in `content`.
    ///
    /// `prompt` is an optional extra instruction; pass `""` for none. The reply
    /// is cleaned of quotes, a leading `v` and trailing punctuation.
    async fn extract_version(&self, content: &[u8], prompt: &str) -> Result<String, LlmError>;

    /// Asks the model how versions could be extracted from `content`
    async fn analyze_content(
        &self,
        content: &[u8],
        meta: &EbuildMetadata,
        hint: &str,
    ) -> Result<SchemaAnalysis, LlmError>;

    /// Model identifier sent with each request
    fn model(&self) -> String;
}

/// Extraction approach suggested by a model for one endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaAnalysis {
    pub parser_type: String,
    pub path: String,
    pub pattern: String,
    pub selector: String,
    pub xpath: String,
    pub fallback_type: String,
    pub fallback_config: String,
    pub confidence: f64,
    pub reasoning: String,
}

impl SchemaAnalysis {
    /// Turns the suggestion into a schema for `url`.
    ///
    /// A fallback is attached when `fallback_type` names a strategy other than
    /// the primary one; `fallback_config` becomes its locator.
    pub fn into_schema(self, url: &str) -> Result<ExtractionSchema, LlmError> {
        let strategy = match self.parser_type.as_str() {
            "json" if !self.path.is_empty() => Strategy::Json { path: self.path },
            "regex" if !self.pattern.is_empty() => Strategy::Regex {
                pattern: self.pattern,
            },
            "html" if !self.selector.is_empty() => Strategy::Html {
                locator: MarkupLocator::Css(self.selector),
                pattern: Some(self.pattern).filter(|p| !p.is_empty()),
            },
            "html" if !self.xpath.is_empty() => Strategy::Html {
                locator: MarkupLocator::XPath(self.xpath),
                pattern: Some(self.pattern).filter(|p| !p.is_empty()),
            },
            other => {
                return Err(LlmError::InvalidResponse(format!(
                    "suggested parser {other:?} has no usable locator"
                )));
            }
        };

        let config = self.fallback_config;
        let fallback = match self.fallback_type.as_str() {
            kind if kind == strategy.kind().as_str() => None,
            "json" if !config.is_empty() => Some(Strategy::Json { path: config }),
            "regex" if !config.is_empty() => Some(Strategy::Regex { pattern: config }),
            "html" if !config.is_empty() => Some(Strategy::Html {
                locator: MarkupLocator::Css(config),
                pattern: None,
            }),
            "llm" => Some(Strategy::Llm {
                prompt: Some(config).filter(|p| !p.is_empty()),
            }),
            _ => None,
        };

        let schema = ExtractionSchema::new(url, strategy);
        Ok(match fallback {
            Some(strategy) => schema.with_fallback(Fallback {
                url: None,
                strategy,
            }),
            None => schema,
        })
    }
}

/// Builds the provider named in `config`, reading its API key from the environment.
pub fn provider_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    provider_from_config_with_env(config, |name| std::env::var(name).ok())
}

fn provider_from_config_with_env(
    config: &LlmConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let api_key = |default_var: &str| {
        let var = if config.api_key_env.is_empty() {
            default_var
        } else {
            config.api_key_env.as_str()
        };
        env(var)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| LlmError::ApiKeyMissing(var.to_string()))
    };
    let model = Some(config.model.clone()).filter(|m| !m.is_empty());
    let base_url = Some(config.base_url.clone()).filter(|u| !u.is_empty());

    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "" => return Err(LlmError::NotConfigured),
        "claude" => Arc::new(ClaudeProvider::new(
            api_key("ANTHROPIC_API_KEY")?,
            model,
            base_url,
        )),
        "openai" => Arc::new(OpenAiProvider::new(
            api_key("OPENAI_API_KEY")?,
            model,
            base_url,
        )),
        "ollama" => Arc::new(OllamaProvider::new(model, base_url)),
        other => return Err(LlmError::UnsupportedProvider(other.to_string())),
    };

    info!(
        "Using LLM provider {} with model {}",
        config.provider,
        provider.model()
    );
    Ok(provider)
}
