//! Schema analysis against discovered and configured sources

mod helper;

use std::sync::Arc;
use std::time::Duration;

use mockito::Server;

use ebuild_autoupdate::cache::AnalysisCache;
use ebuild_autoupdate::config::PackagesConfig;
use ebuild_autoupdate::discovery::SourceType;
use ebuild_autoupdate::extract::{ExtractionEngine, Strategy};
use ebuild_autoupdate::fetch::{ContentFetcher, HttpFetcher};
use ebuild_autoupdate::pipeline::{AnalyzeOptions, Analyzer};
use ebuild_autoupdate::ratelimit::RateLimiter;

use helper::{StaticFetcher, TestOverlay};

const REQUESTS_EBUILD: &str = r#"# Copyright 2024 Gentoo Authors
EAPI=8

DESCRIPTION="HTTP library for human beings"
HOMEPAGE="
	https://requests.readthedocs.io/
	https://github.com/psf/requests
	https://pypi.org/project/requests/
"
SRC_URI="https://files.pythonhosted.org/packages/source/r/requests/requests-${PV}.tar.gz"

RDEPEND="
	>=dev-python/certifi-2017.4.17[${PYTHON_USEDEP}]
	>=dev-python/urllib3-1.21.1[${PYTHON_USEDEP}]
"
"#;

fn analyzer(overlay: &TestOverlay, fetcher: Arc<dyn ContentFetcher>) -> Analyzer {
    Analyzer::new(
        overlay.path(),
        fetcher,
        Arc::new(ExtractionEngine::new(Arc::new(RateLimiter::new()))),
        Arc::new(AnalysisCache::in_memory().unwrap()),
    )
}

fn fast_http_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::with_intervals(
        Duration::from_secs(60),
        Duration::from_millis(10),
    ))
}

#[tokio::test]
async fn requests_resolves_through_github_releases() {
    let overlay = TestOverlay::new().with_ebuild("dev-python/requests", "2.32.3", REQUESTS_EBUILD);
    let fetcher = Arc::new(StaticFetcher::new().with_body(
        "https://api.github.com/repos/psf/requests/releases",
        r#"[{"tag_name": "v2.32.3"}, {"tag_name": "v2.32.2"}]"#,
    ));

    let report = analyzer(&overlay, fetcher.clone())
        .analyze("dev-python/requests", &AnalyzeOptions::default())
        .await
        .unwrap();

    assert_eq!(report.metadata.version, "2.32.3");
    assert!(report.metadata.dependencies.contains(&"dev-python/certifi".to_string()));
    let schema = report.schema.unwrap();
    assert_eq!(schema.url, "https://api.github.com/repos/psf/requests/releases");
    assert_eq!(
        schema.strategy,
        Strategy::Json {
            path: "[0].tag_name".to_string()
        }
    );
    assert_eq!(
        fetcher.requested(),
        vec!["https://api.github.com/repos/psf/requests/releases"]
    );
}

#[tokio::test]
async fn requests_falls_back_to_pypi_when_github_is_unavailable() {
    let overlay = TestOverlay::new().with_ebuild("dev-python/requests", "2.32.3", REQUESTS_EBUILD);
    let fetcher = Arc::new(StaticFetcher::new().with_body(
        "https://pypi.org/pypi/requests/json",
        r#"{"info": {"name": "requests", "version": "2.32.3"}}"#,
    ));

    let report = analyzer(&overlay, fetcher)
        .analyze("dev-python/requests", &AnalyzeOptions::default())
        .await
        .unwrap();

    let source_types: Vec<_> = report.attempts.iter().map(|a| a.source_type).collect();
    assert_eq!(
        source_types,
        vec![Some(SourceType::GitHub), Some(SourceType::PyPI)]
    );
    assert_eq!(
        report.schema.unwrap().url,
        "https://pypi.org/pypi/requests/json"
    );
}

#[tokio::test]
async fn second_analysis_is_served_from_cache() {
    let overlay = TestOverlay::new().with_ebuild("dev-python/requests", "2.32.3", REQUESTS_EBUILD);
    let fetcher = Arc::new(StaticFetcher::new().with_body(
        "https://pypi.org/pypi/requests/json",
        r#"{"info": {"version": "2.32.3"}}"#,
    ));
    let analyzer = analyzer(&overlay, fetcher.clone());

    let first = analyzer
        .analyze("dev-python/requests", &AnalyzeOptions::default())
        .await
        .unwrap();
    let requests_after_first = fetcher.requested().len();
    let second = analyzer
        .analyze("dev-python/requests", &AnalyzeOptions::default())
        .await
        .unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.schema, second.schema);
    assert_eq!(fetcher.requested().len(), requests_after_first);
}

#[tokio::test]
async fn configured_schema_is_validated_over_http() {
    let mut server = Server::new_async().await;
    let _pkgbuild = server
        .mock("GET", "/PKGBUILD")
        .with_status(200)
        .with_body("pkgname=tool\npkgver=0.9.1\npkgrel=2\n")
        .create_async()
        .await;

    let packages = format!(
        r#"
["app-misc/tool"]
url = "{}/PKGBUILD"
parser = "regex"
pattern = "pkgver=([0-9.]+)"
"#,
        server.url()
    );
    let overlay = TestOverlay::new()
        .with_ebuild("app-misc/tool", "0.9.1", "HOMEPAGE=\"https://tool.invalid\"\n")
        .with_packages_toml(&packages);

    let limiter = fast_http_limiter();
    let analyzer = Analyzer::new(
        overlay.path(),
        Arc::new(HttpFetcher::new(Arc::clone(&limiter))),
        Arc::new(ExtractionEngine::new(limiter)),
        Arc::new(AnalysisCache::in_memory().unwrap()),
    )
    .with_packages(PackagesConfig::load(overlay.path()).unwrap());

    let report = analyzer
        .analyze("app-misc/tool", &AnalyzeOptions::default())
        .await
        .unwrap();

    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].source_type, None);
    let validation = report.attempts[0].validation.as_ref().unwrap();
    assert!(validation.valid);
    assert_eq!(validation.extracted_version, "0.9.1");
}

#[tokio::test]
async fn configured_fallback_endpoint_is_used_when_primary_mismatches() {
    let mut server = Server::new_async().await;
    let _primary = server
        .mock("GET", "/api/latest")
        .with_status(200)
        .with_body(r#"{"release": {"name": "nightly"}}"#)
        .create_async()
        .await;
    let _fallback = server
        .mock("GET", "/downloads")
        .with_status(200)
        .with_body("<a href=\"/dl/tool-3.1.0.tar.gz\">tool 3.1.0</a>")
        .create_async()
        .await;

    let packages = format!(
        r#"
["app-misc/tool"]
url = "{url}/api/latest"
parser = "json"
path = "release.name"
fallback_url = "{url}/downloads"
fallback_parser = "regex"
fallback_pattern = "tool-([0-9.]+)\\.tar"
"#,
        url = server.url()
    );
    let overlay = TestOverlay::new()
        .with_ebuild("app-misc/tool", "3.1.0", "")
        .with_packages_toml(&packages);

    let limiter = fast_http_limiter();
    let analyzer = Analyzer::new(
        overlay.path(),
        Arc::new(HttpFetcher::new(Arc::clone(&limiter))),
        Arc::new(ExtractionEngine::new(limiter)),
        Arc::new(AnalysisCache::in_memory().unwrap()),
    )
    .with_packages(PackagesConfig::load(overlay.path()).unwrap());

    let report = analyzer
        .analyze("app-misc/tool", &AnalyzeOptions::default())
        .await
        .unwrap();

    assert!(report.succeeded());
    let validation = report.attempts[0].validation.as_ref().unwrap();
    assert_eq!(validation.extracted_version, "3.1.0");
}
