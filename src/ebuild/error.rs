use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("No ebuild files found for {0}")]
    EbuildNotFound(String),

    #[error("Failed to parse ebuild: {0}")]
    ParseFailed(String),
}
