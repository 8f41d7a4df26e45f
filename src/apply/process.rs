//! External command execution used by the applier

use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(test)]
use mockall::automock;
use tracing::debug;

/// Exit status and interleaved output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

#[cfg_attr(test, automock)]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` in `dir`, waiting for it to exit
    fn run(&self, program: &str, args: &[String], dir: &Path) -> std::io::Result<CommandOutput>;

    /// Whether `program` can be found on `PATH`
    fn exists(&self, program: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String], dir: &Path) -> std::io::Result<CommandOutput> {
        debug!("Running {} {:?} in {:?}", program, args, dir);
        let output = Command::new(program).args(args).current_dir(dir).output()?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: combined,
        })
    }

    fn exists(&self, program: &str) -> bool {
        find_executable(program).is_some()
    }
}

/// First `PATH` entry containing a file named `program`
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
