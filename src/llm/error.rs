use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM provider not configured")]
    NotConfigured,

    #[error("LLM API key environment variable {0} not set")]
    ApiKeyMissing(String),

    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("Cannot reach LLM service: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("LLM API request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("LLM returned empty response")]
    EmptyResponse,

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LlmError::InvalidResponse(err.to_string())
        } else {
            LlmError::Connection(err)
        }
    }
}
