//! Discovery of endpoints that may expose a package's upstream version
//!
//! Priorities: explicit override (0) < GitHub releases (10) < PyPI / npm /
//! crates.io (20) < homepage (100).

pub mod discover;
pub mod source;

pub use discover::{discover_data_sources, github_repository};
pub use source::{ContentType, DataSource, SourceType};
