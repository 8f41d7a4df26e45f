//! In-memory stand-ins for network and process collaborators

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use ebuild_autoupdate::apply::{CommandOutput, CommandRunner};
use ebuild_autoupdate::fetch::{ContentFetcher, FetchError, FetchedContent};

/// Serves fixed bodies by URL; unknown URLs answer 404
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    /// URLs fetched so far, in request order
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("requested lock").clone()
    }
}

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch(
        &self,
        url: &str,
        _headers: &BTreeMap<String, String>,
    ) -> Result<FetchedContent, FetchError> {
        self.requested
            .lock()
            .expect("requested lock")
            .push(url.to_string());
        match self.bodies.get(url) {
            Some(body) => Ok(FetchedContent {
                body: body.as_bytes().to_vec(),
                content_type: None,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Records every command and answers with a fixed outcome per program
pub struct RecordingRunner {
    failing: Vec<String>,
    available: Vec<String>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingRunner {
    /// Every program succeeds; `doas` is the only privilege tool present
    pub fn new() -> Self {
        Self {
            failing: Vec::new(),
            available: vec!["doas".to_string()],
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runs whose arguments contain `arg` exit with status 1
    pub fn failing_on(mut self, arg: &str) -> Self {
        self.failing.push(arg.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[String], _dir: &Path) -> std::io::Result<CommandOutput> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((program.to_string(), args.to_vec()));
        let success = !args.iter().any(|a| self.failing.contains(a));
        Ok(CommandOutput {
            success,
            code: Some(if success { 0 } else { 1 }),
            output: if success {
                String::new()
            } else {
                format!("{program} failed\n")
            },
        })
    }

    fn exists(&self, program: &str) -> bool {
        self.available.iter().any(|p| p == program)
    }
}
