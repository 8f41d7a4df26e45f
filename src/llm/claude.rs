//! Anthropic Messages API provider

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::FETCH_TIMEOUT;
use crate::ebuild::EbuildMetadata;
use crate::llm::error::LlmError;
use crate::llm::prompt::{
    clean_version_reply, parse_schema_analysis, schema_analysis_prompt, version_extraction_prompt,
};
use crate::llm::provider::{LlmProvider, SchemaAnalysis};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    async fn complete(&self, prompt: String, max_tokens: u32) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        debug!("Sending Claude request to {} (model {})", url, self.model);

        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: vec![json!({"role": "user", "content": prompt})],
        };

        let response = self
            .client
            .post(&url)
            .timeout(FETCH_TIMEOUT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(LlmError::RequestFailed {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait::async_trait]
impl LlmProvider for ClaudeProvider {
    async fn extract_version(&self, content: &[u8], prompt: &str) -> Result<String, LlmError> {
        let reply = self
            .complete(version_extraction_prompt(content, prompt), 100)
            .await?;
        let version = clean_version_reply(&reply);
        if version.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(version)
    }

    async fn analyze_content(
        &self,
        content: &[u8],
        meta: &EbuildMetadata,
        hint: &str,
    ) -> Result<SchemaAnalysis, LlmError> {
        let reply = self
            .complete(schema_analysis_prompt(content, meta, hint), 1000)
            .await?;
        parse_schema_analysis(&reply)
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}
