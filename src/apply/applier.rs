//! Applies a pending version bump to the overlay

use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::apply::error::ApplyError;
use crate::apply::ledger::{PendingStatus, PendingStore, PendingUpdate};
use crate::apply::process::{CommandRunner, SystemCommandRunner};
use crate::config;
use crate::ebuild::{PackageId, find_version_files};

/// Asks the user a yes/no question
pub type Confirm = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Privilege escalation tools in order of preference
const PRIVILEGE_TOOLS: [&str; 2] = ["doas", "sudo"];

/// Outcome of one apply attempt
#[derive(Debug, Serialize)]
pub struct ApplyResult {
    pub package: String,
    pub old_version: String,
    pub new_version: String,
    /// Copy and manifest succeeded, and so did the build probe when requested
    pub success: bool,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ApplyError>,
    pub log_path: Option<PathBuf>,
    /// Files under `files/` that mention the old version and may need renaming
    pub version_files: Vec<PathBuf>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<ApplyError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl ApplyResult {
    fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            old_version: String::new(),
            new_version: String::new(),
            success: false,
            error: None,
            log_path: None,
            version_files: Vec::new(),
        }
    }

    fn failed(mut self, error: ApplyError) -> Self {
        self.success = false;
        self.error = Some(error);
        self
    }
}

/// Reads `[y/N]` from stdin
pub fn stdin_confirm(question: &str) -> bool {
    print!("{question} [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub struct Applier {
    overlay: PathBuf,
    logs_dir: PathBuf,
    store: Arc<dyn PendingStore>,
    runner: Arc<dyn CommandRunner>,
    confirm: Confirm,
}

impl Applier {
    pub fn new(overlay: impl Into<PathBuf>, store: Arc<dyn PendingStore>) -> Self {
        Self {
            overlay: overlay.into(),
            logs_dir: config::logs_dir(),
            store,
            runner: Arc::new(SystemCommandRunner),
            confirm: Box::new(stdin_confirm),
        }
    }

    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_confirm(mut self, confirm: Confirm) -> Self {
        self.confirm = confirm;
        self
    }

    /// Copies the current ebuild to the new version, regenerates the manifest
    /// and optionally runs a privileged `clean compile` build probe.
    ///
    /// The ledger entry ends up `validated` once the manifest is regenerated and
    /// `failed` when any step after the lookup fails, except a declined probe.
    pub fn apply(&self, package: &str, run_build_probe: bool) -> ApplyResult {
        let mut result = ApplyResult::new(package);

        let update = match self.store.get(package) {
            Ok(Some(update)) => update,
            Ok(None) => return result.failed(ApplyError::PackageNotInPending(package.to_string())),
            Err(e) => return result.failed(e.into()),
        };
        result.old_version = update.current_version.clone();
        result.new_version = update.new_version.clone();

        let id: PackageId = match package.parse() {
            Ok(id) => id,
            Err(e) => return result.failed(ApplyError::InvalidPackage(e)),
        };

        info!(
            "Applying {} {} -> {}",
            package, update.current_version, update.new_version
        );

        let new_ebuild = match self.prepare(&id, &update) {
            Ok(path) => path,
            Err(e) => return result.failed(self.record_failure(package, e)),
        };

        if let Err(e) = self.store.set_status(
            package,
            PendingStatus::Validated,
            "ebuild copied and manifest regenerated",
        ) {
            return result.failed(e.into());
        }

        result.version_files = find_version_files(&self.overlay, &id, &update.current_version);
        for file in &result.version_files {
            warn!(
                "{} references version {} and may need updating",
                file.display(),
                update.current_version
            );
        }

        if !run_build_probe {
            result.success = true;
            return result;
        }

        match self.build_probe(&id, &update, &new_ebuild) {
            Ok(()) => {
                info!("Build probe for {} {} passed", package, update.new_version);
                result.success = true;
                result
            }
            Err(ApplyError::UserDeclined) => result.failed(ApplyError::UserDeclined),
            Err(e) => {
                if let ApplyError::CompileFailed { log_path } = &e {
                    result.log_path = Some(log_path.clone());
                }
                result.failed(self.record_failure(package, e))
            }
        }
    }

    /// Copy and manifest steps; returns the new ebuild path
    fn prepare(&self, id: &PackageId, update: &PendingUpdate) -> Result<PathBuf, ApplyError> {
        let source = id.ebuild_path(&self.overlay, &update.current_version);
        let target = id.ebuild_path(&self.overlay, &update.new_version);

        copy_synced(&source, &target)?;
        info!("Created {}", target.display());

        let args = vec![target.display().to_string(), "manifest".to_string()];
        let output = self
            .runner
            .run("ebuild", &args, &self.overlay)
            .map_err(|e| ApplyError::ManifestFailed(e.to_string()))?;
        if !output.success {
            return Err(ApplyError::ManifestFailed(format!(
                "ebuild manifest exited with {}: {}",
                output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                output.output.trim()
            )));
        }

        Ok(target)
    }

    fn build_probe(
        &self,
        id: &PackageId,
        update: &PendingUpdate,
        new_ebuild: &Path,
    ) -> Result<(), ApplyError> {
        let question = format!(
            "Run a test build of {} {} with root privileges?",
            update.package, update.new_version
        );
        if !(self.confirm)(&question) {
            info!("Build probe for {} declined", update.package);
            return Err(ApplyError::UserDeclined);
        }

        let tool = PRIVILEGE_TOOLS
            .into_iter()
            .find(|tool| self.runner.exists(tool))
            .ok_or(ApplyError::NoPrivilegeEscalation)?;

        let args = vec![
            "ebuild".to_string(),
            new_ebuild.display().to_string(),
            "clean".to_string(),
            "compile".to_string(),
        ];
        info!("Running {} ebuild {} clean compile", tool, new_ebuild.display());
        let output = match self.runner.run(tool, &args, &self.overlay) {
            Ok(output) if output.success => return Ok(()),
            Ok(output) => output.output,
            Err(e) => format!("failed to run {tool}: {e}"),
        };

        let log_path = self.logs_dir.join(format!(
            "{}-{}-{}.log",
            id.flat(),
            update.new_version,
            Local::now().format("%Y%m%d-%H%M%S")
        ));
        write_log(&log_path, &output)?;
        Err(ApplyError::CompileFailed { log_path })
    }

    /// Marks the entry failed; a ledger error is attached to `cause`
    fn record_failure(&self, package: &str, cause: ApplyError) -> ApplyError {
        error!("Applying {} failed: {}", package, cause);
        if !cause.marks_failed() {
            return cause;
        }
        match self
            .store
            .set_status(package, PendingStatus::Failed, &cause.to_string())
        {
            Ok(()) => cause,
            Err(source) => ApplyError::StatusUpdate {
                cause: Box::new(cause),
                source,
            },
        }
    }
}

fn copy_synced(source: &Path, target: &Path) -> Result<(), ApplyError> {
    let mut reader = match File::open(source) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApplyError::EbuildNotFound(source.to_path_buf()));
        }
        Err(e) => {
            return Err(ApplyError::Copy {
                path: target.to_path_buf(),
                source: e,
            });
        }
    };

    // Creating the target would truncate the source.
    if source == target {
        warn!("{} is already at the requested version, not copying", source.display());
        return Ok(());
    }

    let copy_err = |source| ApplyError::Copy {
        path: target.to_path_buf(),
        source,
    };
    let mut writer = File::create(target).map_err(copy_err)?;
    std::io::copy(&mut reader, &mut writer).map_err(copy_err)?;
    writer.sync_all().map_err(copy_err)
}

fn write_log(path: &Path, output: &str) -> Result<(), ApplyError> {
    let log_err = |source| ApplyError::LogWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(log_err)?;
    }
    std::fs::write(path, output).map_err(log_err)
}
