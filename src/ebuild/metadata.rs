//! Metadata extraction from the best recipe of a package

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ebuild::error::MetadataError;
use crate::ebuild::types::{EbuildMetadata, PackageId, is_live_version};
use crate::ebuild::vars::{
    detect_binary_package, extract_dependencies, extract_multiline_var, version_from_file_stem,
};
use crate::ebuild::version::{EbuildVersionOrder, VersionComparator};

/// Reads recipe metadata from an overlay using a pluggable version order
pub struct MetadataExtractor<C = EbuildVersionOrder> {
    comparator: C,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(EbuildVersionOrder)
    }
}

impl<C: VersionComparator> MetadataExtractor<C> {
    pub fn new(comparator: C) -> Self {
        Self { comparator }
    }

    /// Parses the highest-versioned recipe of `package` under `overlay`.
    ///
    /// Live recipes are chosen only when no regular version exists.
    pub fn extract(&self, overlay: &Path, package: &str) -> Result<EbuildMetadata, MetadataError> {
        let id: PackageId = package.parse()?;
        let dir = id.dir(overlay);
        if !dir.is_dir() {
            return Err(MetadataError::PackageNotFound(package.to_string()));
        }

        let ebuilds = find_ebuilds(&dir)?;
        let (path, version) = self
            .select_best(&ebuilds)
            .ok_or_else(|| MetadataError::EbuildNotFound(package.to_string()))?;

        debug!("Selected {:?} (version {:?}) for {}", path, version, package);

        let content = std::fs::read_to_string(path)
            .map_err(|e| MetadataError::ParseFailed(format!("{}: {e}", path.display())))?;

        Ok(EbuildMetadata {
            package: package.to_string(),
            is_live: is_live_version(&version),
            version,
            homepage: extract_multiline_var(&content, "HOMEPAGE"),
            src_uri: extract_multiline_var(&content, "SRC_URI"),
            dependencies: extract_dependencies(&content),
            is_binary: detect_binary_package(&content),
        })
    }

    fn select_best<'a>(&self, ebuilds: &'a [PathBuf]) -> Option<(&'a PathBuf, String)> {
        let versioned = ebuilds.iter().filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            version_from_file_stem(stem).map(|v| (path, v.to_string()))
        });

        let best = versioned.max_by(|(_, a), (_, b)| {
            match (is_live_version(a), is_live_version(b)) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => self.comparator.compare(a, b),
            }
        });

        best.or_else(|| ebuilds.first().map(|path| (path, String::new())))
    }
}

/// Lists `.ebuild` files in a package directory, sorted by file name
fn find_ebuilds(dir: &Path) -> Result<Vec<PathBuf>, MetadataError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        MetadataError::ParseFailed(format!("cannot read directory {}: {e}", dir.display()))
    })?;

    let mut ebuilds: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "ebuild"))
        .collect();
    ebuilds.sort();
    Ok(ebuilds)
}

/// Files under the package's `files/` directory whose names contain `version`
pub fn find_version_files(overlay: &Path, package: &PackageId, version: &str) -> Vec<PathBuf> {
    if version.is_empty() {
        return Vec::new();
    }

    let Ok(entries) = std::fs::read_dir(package.dir(overlay).join("files")) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| entry.file_name().to_string_lossy().contains(version))
        .map(|entry| entry.path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn overlay_with(package: &str, files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let pkg_dir = dir.path().join(package);
        std::fs::create_dir_all(&pkg_dir).unwrap();
        for (name, content) in files {
            std::fs::write(pkg_dir.join(name), content).unwrap();
        }
        dir
    }

    const REQUESTS_EBUILD: &str = r#"EAPI=8
DESCRIPTION="HTTP library for human beings"
HOMEPAGE="https://github.com/psf/requests https://pypi.org/project/requests/"
SRC_URI="https://github.com/psf/requests/archive/v${PV}.tar.gz -> ${P}.gh.tar.gz"

RDEPEND="
	>=dev-python/certifi-2017.4.17[${PYTHON_USEDEP}]
	dev-python/idna[${PYTHON_USEDEP}]
"
DEPEND="test? ( dev-python/pytest[${PYTHON_USEDEP}] )"
"#;

    #[test]
    fn extract_reads_highest_version_metadata() {
        let overlay = overlay_with(
            "dev-python/requests",
            &[
                ("requests-2.31.0.ebuild", REQUESTS_EBUILD),
                ("requests-2.9.0.ebuild", "HOMEPAGE=\"old\"\n"),
                ("metadata.xml", "<pkgmetadata/>"),
            ],
        );

        let meta = MetadataExtractor::default()
            .extract(overlay.path(), "dev-python/requests")
            .unwrap();

        assert_eq!(
            meta,
            EbuildMetadata {
                package: "dev-python/requests".to_string(),
                version: "2.31.0".to_string(),
                homepage: "https://github.com/psf/requests https://pypi.org/project/requests/"
                    .to_string(),
                src_uri: "https://github.com/psf/requests/archive/v${PV}.tar.gz -> ${P}.gh.tar.gz"
                    .to_string(),
                dependencies: vec![
                    "dev-python/pytest".to_string(),
                    "dev-python/certifi".to_string(),
                    "dev-python/idna".to_string(),
                ],
                is_live: false,
                is_binary: false,
            }
        );
    }

    #[test]
    fn extract_prefers_release_over_live() {
        let overlay = overlay_with(
            "app-misc/tool",
            &[
                ("tool-9999.ebuild", "HOMEPAGE=\"live\"\n"),
                ("tool-1.0.ebuild", "HOMEPAGE=\"release\"\n"),
            ],
        );

        let meta = MetadataExtractor::default()
            .extract(overlay.path(), "app-misc/tool")
            .unwrap();

        assert_eq!(meta.version, "1.0");
        assert_eq!(meta.homepage, "release");
        assert!(!meta.is_live);
    }

    #[test]
    fn extract_uses_live_when_it_is_the_only_recipe() {
        let overlay = overlay_with("app-misc/tool", &[("tool-9999.ebuild", "")]);

        let meta = MetadataExtractor::default()
            .extract(overlay.path(), "app-misc/tool")
            .unwrap();

        assert_eq!(meta.version, "9999");
        assert!(meta.is_live);
    }

    #[test]
    fn extract_orders_by_gentoo_rules() {
        let overlay = overlay_with(
            "app-misc/tool",
            &[
                ("tool-1.0_rc1.ebuild", ""),
                ("tool-1.0.ebuild", ""),
                ("tool-1.0-r1.ebuild", ""),
            ],
        );

        let meta = MetadataExtractor::default()
            .extract(overlay.path(), "app-misc/tool")
            .unwrap();

        assert_eq!(meta.version, "1.0-r1");
    }

    #[test]
    fn extract_falls_back_to_first_file_without_version() {
        let overlay = overlay_with("app-misc/tool", &[("tool.ebuild", "HOMEPAGE=\"x\"\n")]);

        let meta = MetadataExtractor::default()
            .extract(overlay.path(), "app-misc/tool")
            .unwrap();

        assert_eq!(meta.version, "");
        assert_eq!(meta.homepage, "x");
    }

    #[test]
    fn extract_reports_invalid_package_id() {
        let overlay = TempDir::new().unwrap();

        let err = MetadataExtractor::default()
            .extract(overlay.path(), "requests")
            .unwrap_err();

        assert!(matches!(err, MetadataError::PackageNotFound(_)));
    }

    #[test]
    fn extract_reports_missing_directory() {
        let overlay = TempDir::new().unwrap();

        let err = MetadataExtractor::default()
            .extract(overlay.path(), "dev-python/missing")
            .unwrap_err();

        assert!(matches!(err, MetadataError::PackageNotFound(_)));
    }

    #[test]
    fn extract_reports_directory_without_recipes() {
        let overlay = overlay_with("dev-python/empty", &[("metadata.xml", "")]);

        let err = MetadataExtractor::default()
            .extract(overlay.path(), "dev-python/empty")
            .unwrap_err();

        assert!(matches!(err, MetadataError::EbuildNotFound(_)));
    }

    #[test]
    fn extract_detects_binary_package() {
        let overlay = overlay_with(
            "app-misc/tool-bin",
            &[("tool-bin-2.0.ebuild", "RESTRICT=\"bindist strip\"\n")],
        );

        let meta = MetadataExtractor::default()
            .extract(overlay.path(), "app-misc/tool-bin")
            .unwrap();

        assert!(meta.is_binary);
    }

    #[test]
    fn find_version_files_matches_names_containing_version() {
        let overlay = overlay_with("app-misc/tool", &[("tool-1.0.ebuild", "")]);
        let files_dir = overlay.path().join("app-misc/tool/files");
        std::fs::create_dir_all(&files_dir).unwrap();
        std::fs::write(files_dir.join("tool-1.0-fix.patch"), "").unwrap();
        std::fs::write(files_dir.join("tool.conf"), "").unwrap();

        let files = find_version_files(
            overlay.path(),
            &PackageId::new("app-misc", "tool"),
            "1.0",
        );

        assert_eq!(files, vec![files_dir.join("tool-1.0-fix.patch")]);
    }

    #[test]
    fn find_version_files_returns_empty_without_files_dir() {
        let overlay = overlay_with("app-misc/tool", &[("tool-1.0.ebuild", "")]);

        let files = find_version_files(
            overlay.path(),
            &PackageId::new("app-misc", "tool"),
            "1.0",
        );

        assert!(files.is_empty());
    }
}
