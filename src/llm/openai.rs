//! OpenAI Chat Completions provider

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!("Sending OpenAI request to {} (model {})", url, self.model);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .timeout(FETCH_TIMEOUT)
            .bearer_auth(&self.api_key)
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

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
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
impl LlmProvider for OpenAiProvider {
    async fn extract_version(&self, content: &[u8], prompt: &str) -> Result<String, LlmError> {
        let reply = self
            .complete(&version_extraction_prompt(content, prompt), 100)
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
            .complete(&schema_analysis_prompt(content, meta, hint), 1000)
            .await?;
        parse_schema_analysis(&reply)
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}
