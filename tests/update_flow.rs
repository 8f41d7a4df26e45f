//! Check → pending ledger → apply, end to end against a temporary overlay

mod helper;

use std::sync::Arc;
use std::time::Duration;

use mockito::Server;
use tempfile::TempDir;

use ebuild_autoupdate::apply::{
    Applier, ApplyError, PendingStatus, PendingStore, PendingUpdate, SqlitePendingStore,
};
use ebuild_autoupdate::cache::AnalysisCache;
use ebuild_autoupdate::config::PackagesConfig;
use ebuild_autoupdate::extract::ExtractionEngine;
use ebuild_autoupdate::fetch::HttpFetcher;
use ebuild_autoupdate::pipeline::{AnalyzeOptions, Analyzer};
use ebuild_autoupdate::ratelimit::RateLimiter;

use helper::{RecordingRunner, TestOverlay};

const TOOL_EBUILD: &str = r#"EAPI=8
DESCRIPTION="Example tool"
HOMEPAGE="https://tool.example.org"
SRC_URI="https://tool.example.org/dl/${P}.tar.gz"
"#;

fn analyzer(overlay: &TestOverlay, url: &str, ledger: Arc<dyn PendingStore>) -> Analyzer {
    let packages = PackagesConfig::parse(&format!(
        r#"
["app-misc/tool"]
url = "{url}/releases.json"
parser = "json"
path = "releases[0].version"
versions_path = "releases[*].version"
"#
    ))
    .unwrap();
    let limiter = Arc::new(RateLimiter::with_intervals(
        Duration::from_secs(60),
        Duration::from_millis(10),
    ));
    Analyzer::new(
        overlay.path(),
        Arc::new(HttpFetcher::new(Arc::clone(&limiter))),
        Arc::new(ExtractionEngine::new(limiter)),
        Arc::new(AnalysisCache::in_memory().unwrap()),
    )
    .with_packages(packages)
    .with_ledger(ledger)
}

#[tokio::test]
async fn check_then_apply_bumps_the_ebuild() {
    let mut server = Server::new_async().await;
    let _releases = server
        .mock("GET", "/releases.json")
        .with_status(200)
        .with_body(r#"{"releases": [{"version": "v1.5.0"}, {"version": "v1.4.0"}]}"#)
        .create_async()
        .await;
    let overlay = TestOverlay::new()
        .with_ebuild("app-misc/tool", "1.4.0", TOOL_EBUILD)
        .with_package_file("app-misc/tool", "tool-1.4.0-fix-build.patch", "");
    let ledger = Arc::new(SqlitePendingStore::in_memory().unwrap());

    let outcome = analyzer(&overlay, &server.url(), ledger.clone())
        .check("app-misc/tool", &AnalyzeOptions::default())
        .await
        .unwrap();

    assert!(outcome.update_available);
    assert_eq!(outcome.upstream_version, "1.5.0");
    assert_eq!(outcome.history, vec!["v1.5.0", "v1.4.0"]);

    let logs = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let result = Applier::new(overlay.path(), ledger.clone())
        .with_logs_dir(logs.path())
        .with_runner(runner.clone())
        .with_confirm(Box::new(|_| false))
        .apply("app-misc/tool", false);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.old_version, "1.4.0");
    assert_eq!(result.new_version, "1.5.0");
    assert_eq!(
        std::fs::read_to_string(overlay.ebuild_path("app-misc/tool", "1.5.0")).unwrap(),
        TOOL_EBUILD
    );
    assert_eq!(result.version_files.len(), 1);

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "ebuild");
    assert_eq!(calls[0].1[1], "manifest");

    let entry = ledger.get("app-misc/tool").unwrap().unwrap();
    assert_eq!(entry.status, PendingStatus::Validated);
}

#[test]
fn failed_build_probe_marks_entry_failed_and_keeps_log() {
    let overlay = TestOverlay::new().with_ebuild("app-misc/tool", "1.4.0", TOOL_EBUILD);
    let ledger = Arc::new(SqlitePendingStore::in_memory().unwrap());
    ledger
        .add(PendingUpdate::new("app-misc/tool", "1.4.0", "1.5.0"))
        .unwrap();
    let logs = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new().failing_on("compile"));

    let result = Applier::new(overlay.path(), ledger.clone())
        .with_logs_dir(logs.path())
        .with_runner(runner.clone())
        .with_confirm(Box::new(|_| true))
        .apply("app-misc/tool", true);

    assert!(!result.success);
    assert!(matches!(result.error, Some(ApplyError::CompileFailed { .. })));
    let log_path = result.log_path.unwrap();
    assert!(log_path.starts_with(logs.path()));
    assert!(
        log_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("app-misc_tool-1.5.0-")
    );
    assert_eq!(
        std::fs::read_to_string(&log_path).unwrap(),
        "doas failed\n"
    );

    let probe = &runner.calls()[1];
    assert_eq!(probe.0, "doas");
    assert_eq!(probe.1[0], "ebuild");
    assert_eq!(&probe.1[2..], ["clean", "compile"]);

    let entry = ledger.get("app-misc/tool").unwrap().unwrap();
    assert_eq!(entry.status, PendingStatus::Failed);
}

#[test]
fn declined_build_probe_leaves_entry_validated() {
    let overlay = TestOverlay::new().with_ebuild("app-misc/tool", "1.4.0", TOOL_EBUILD);
    let ledger = Arc::new(SqlitePendingStore::in_memory().unwrap());
    ledger
        .add(PendingUpdate::new("app-misc/tool", "1.4.0", "1.5.0"))
        .unwrap();
    let runner = Arc::new(RecordingRunner::new());

    let result = Applier::new(overlay.path(), ledger.clone())
        .with_runner(runner.clone())
        .with_confirm(Box::new(|_| false))
        .apply("app-misc/tool", true);

    assert!(!result.success);
    assert!(matches!(result.error, Some(ApplyError::UserDeclined)));
    assert_eq!(runner.calls().len(), 1);
    assert_eq!(
        ledger.get("app-misc/tool").unwrap().unwrap().status,
        PendingStatus::Validated
    );
}
