//! Local Ollama provider

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FETCH_TIMEOUT;
use crate::ebuild::EbuildMetadata;
use crate::llm::error::LlmError;
use crate::llm::prompt::{
    clean_version_reply, parse_schema_analysis, schema_analysis_prompt, version_extraction_prompt,
};
use crate::llm::provider::{LlmProvider, SchemaAnalysis};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3";

pub struct OllamaProvider {
    client: Client,
    model: String,
    base_url: String,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl OllamaProvider {
    pub fn new(model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    async fn generate(&self, prompt: &str, num_predict: u32) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        debug!("Sending Ollama request to {} (model {})", url, self.model);

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.0,
                num_predict,
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(FETCH_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&raw)
                .map(|e| e.error)
                .unwrap_or(raw);
            return Err(LlmError::RequestFailed {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        if parsed.response.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(parsed.response)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    async fn extract_version(&self, content: &[u8], prompt: &str) -> Result<String, LlmError> {
        let reply = self
            .generate(&version_extraction_prompt(content, prompt), 100)
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
            .generate(&schema_analysis_prompt(content, meta, hint), 1000)
            .await?;
        parse_schema_analysis(&reply)
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}
