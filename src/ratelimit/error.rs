use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// The wait was cancelled before a token became available
    #[error("rate limit exceeded")]
    Exceeded,

    #[error("bucket has zero burst and can never admit a request")]
    ZeroBurst,
}
