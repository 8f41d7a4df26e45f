//! Common types for recipe metadata

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ebuild::error::MetadataError;

/// A `category/name` package identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId {
    pub category: String,
    pub name: String,
}

impl PackageId {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Directory holding this package's recipes inside an overlay
    pub fn dir(&self, overlay: &Path) -> PathBuf {
        overlay.join(&self.category).join(&self.name)
    }

    /// Path of the recipe for `version`
    pub fn ebuild_path(&self, overlay: &Path, version: &str) -> PathBuf {
        self.dir(overlay)
            .join(format!("{}-{}.ebuild", self.name, version))
    }

    /// `category_name`, used where a slash is not allowed (file names)
    pub fn flat(&self) -> String {
        format!("{}_{}", self.category, self.name)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

impl FromStr for PackageId {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(category), Some(name), None) if !category.is_empty() && !name.is_empty() => {
                Ok(Self::new(category, name))
            }
            _ => Err(MetadataError::PackageNotFound(format!(
                "invalid package format {s:?}, expected category/package"
            ))),
        }
    }
}

impl TryFrom<String> for PackageId {
    type Error = MetadataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageId> for String {
    fn from(value: PackageId) -> Self {
        value.to_string()
    }
}

/// Facts recovered from the selected recipe of one package
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EbuildMetadata {
    /// `category/name`
    pub package: String,
    /// Version of the selected recipe; empty when no file name carried one
    pub version: String,
    pub homepage: String,
    pub src_uri: String,
    /// Dependency atoms reduced to `category/name`, DEPEND first then RDEPEND
    pub dependencies: Vec<String>,
    pub is_live: bool,
    pub is_binary: bool,
}

impl EbuildMetadata {
    /// The package's category (`dev-python` for `dev-python/requests`)
    pub fn category(&self) -> &str {
        self.package.split_once('/').map_or("", |(category, _)| category)
    }

    /// The package's name without category
    pub fn name(&self) -> &str {
        self.package
            .split_once('/')
            .map_or(self.package.as_str(), |(_, name)| name)
    }
}

/// `9999` and versions beginning with `9999` denote live (VCS HEAD) recipes
pub fn is_live_version(version: &str) -> bool {
    version.starts_with("9999")
}
