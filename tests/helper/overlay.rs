//! Temporary overlay trees

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// An overlay rooted in a temporary directory, removed on drop
pub struct TestOverlay {
    dir: TempDir,
}

impl TestOverlay {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create overlay dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `{category}/{name}/{name}-{version}.ebuild`
    pub fn with_ebuild(self, package: &str, version: &str, content: &str) -> Self {
        let (category, name) = package.split_once('/').expect("category/name");
        let dir = self.path().join(category).join(name);
        fs::create_dir_all(&dir).expect("create package dir");
        fs::write(dir.join(format!("{name}-{version}.ebuild")), content).expect("write ebuild");
        self
    }

    /// Writes a file below the package's `files/` directory
    pub fn with_package_file(self, package: &str, file: &str, content: &str) -> Self {
        let dir = self.path().join(package).join("files");
        fs::create_dir_all(&dir).expect("create files dir");
        fs::write(dir.join(file), content).expect("write package file");
        self
    }

    pub fn with_packages_toml(self, content: &str) -> Self {
        let dir = self.path().join(".autoupdate");
        fs::create_dir_all(&dir).expect("create .autoupdate");
        fs::write(dir.join("packages.toml"), content).expect("write packages.toml");
        self
    }

    pub fn ebuild_path(&self, package: &str, version: &str) -> PathBuf {
        let name = package.rsplit('/').next().expect("package name");
        self.path()
            .join(package)
            .join(format!("{name}-{version}.ebuild"))
    }
}
