use std::path::PathBuf;

use thiserror::Error;

use crate::ebuild::MetadataError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{0} is not in the pending list")]
    PackageNotInPending(String),

    #[error("ebuild not found: {}", .0.display())]
    EbuildNotFound(PathBuf),

    #[error("failed to copy ebuild to {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("manifest generation failed: {0}")]
    ManifestFailed(String),

    #[error("no privilege escalation tool found (need doas or sudo)")]
    NoPrivilegeEscalation,

    #[error("build probe declined by user")]
    UserDeclined,

    #[error("compilation failed, output saved to {}", log_path.display())]
    CompileFailed { log_path: PathBuf },

    #[error("compilation failed and its output could not be saved to {}: {source}", path.display())]
    LogWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{cause} (status update also failed: {source})")]
    StatusUpdate {
        cause: Box<ApplyError>,
        source: StoreError,
    },

    #[error(transparent)]
    InvalidPackage(#[from] MetadataError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApplyError {
    /// Whether the failure moves the ledger entry to `failed`
    pub fn marks_failed(&self) -> bool {
        !matches!(
            self,
            ApplyError::PackageNotInPending(_)
                | ApplyError::UserDeclined
                | ApplyError::InvalidPackage(_)
                | ApplyError::Store(_)
                | ApplyError::StatusUpdate { .. }
        )
    }
}
