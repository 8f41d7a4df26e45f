//! Recipe (ebuild) reading
//!
//! # Modules
//!
//! - [`metadata`]: Selects the best recipe of a package and extracts its metadata
//! - [`vars`]: Multi-line variable, dependency and binary-package parsing
//! - [`version`]: Gentoo version ordering behind the [`version::VersionComparator`] trait
//! - [`types`]: `PackageId` and `EbuildMetadata`
//! - [`error`]: Metadata extraction errors

pub mod error;
pub mod metadata;
pub mod types;
pub mod vars;
pub mod version;

pub use error::MetadataError;
pub use metadata::{MetadataExtractor, find_version_files};
pub use types::{EbuildMetadata, PackageId, is_live_version};
