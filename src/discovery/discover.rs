//! Candidate endpoint discovery from recipe metadata

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::discovery::source::{
    ContentType, DataSource, PRIORITY_GITHUB, PRIORITY_HOMEPAGE, PRIORITY_PROVIDED,
    PRIORITY_REGISTRY, SourceType,
};
use crate::ebuild::EbuildMetadata;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

static GITHUB_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"github\.com[/:]([^/]+)/([^/\s"'#?]+)"#));
static PYPI_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"pypi\.(?:org|io|python\.org)/project/([^/\s"'#?]+)"#));
static PYPI_FILES: LazyLock<Regex> =
    LazyLock::new(|| compile(r"files\.pythonhosted\.org/packages/.*?/([^/]+)-\d"));
static NPM_URL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"(?:npmjs\.(?:org|com)|registry\.npmjs\.org)/(?:package/)?([^/\s"'#?]+)"#)
});
static CRATES_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"crates\.io/crates/([^/\s"'#?]+)"#));

static PYTHON_DEP: LazyLock<Regex> = LazyLock::new(|| compile(r"dev-python/|python-"));
static NODE_DEP: LazyLock<Regex> = LazyLock::new(|| compile(r"net-libs/nodejs|dev-nodejs/"));
static RUST_DEP: LazyLock<Regex> = LazyLock::new(|| compile(r"dev-lang/rust|virtual/rust"));

/// One package ecosystem that can be inferred from URLs or dependencies
struct Registry {
    source_type: SourceType,
    url_patterns: &'static [&'static LazyLock<Regex>],
    dependency_hint: &'static LazyLock<Regex>,
    /// Category whose package names equal the upstream registry names
    category: &'static str,
    endpoint: fn(&str) -> String,
}

static REGISTRIES: [Registry; 3] = [
    Registry {
        source_type: SourceType::PyPI,
        url_patterns: &[&PYPI_URL, &PYPI_FILES],
        dependency_hint: &PYTHON_DEP,
        category: "dev-python",
        endpoint: |name| format!("https://pypi.org/pypi/{name}/json"),
    },
    Registry {
        source_type: SourceType::Npm,
        url_patterns: &[&NPM_URL],
        dependency_hint: &NODE_DEP,
        category: "dev-nodejs",
        endpoint: |name| format!("https://registry.npmjs.org/{name}"),
    },
    Registry {
        source_type: SourceType::Crates,
        url_patterns: &[&CRATES_URL],
        dependency_hint: &RUST_DEP,
        category: "dev-rust",
        endpoint: |name| format!("https://crates.io/api/v1/crates/{name}"),
    },
];

impl Registry {
    /// Name from an explicit registry URL in HOMEPAGE, then SRC_URI
    fn name_from_urls<'m>(&self, meta: &'m EbuildMetadata) -> Option<&'m str> {
        [meta.homepage.as_str(), meta.src_uri.as_str()]
            .into_iter()
            .find_map(|text| {
                self.url_patterns
                    .iter()
                    .find_map(|re| re.captures(text))
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str())
            })
    }

    /// Name inferred from a dependency hint plus the package's own category
    fn name_from_dependencies<'m>(&self, meta: &'m EbuildMetadata) -> Option<&'m str> {
        let hinted = meta
            .dependencies
            .iter()
            .any(|dep| self.dependency_hint.is_match(dep));
        (hinted && meta.category() == self.category).then(|| meta.name())
    }

    fn discover(&self, meta: &EbuildMetadata) -> Option<DataSource> {
        let name = self
            .name_from_urls(meta)
            .or_else(|| self.name_from_dependencies(meta))?;
        Some(DataSource::new(
            (self.endpoint)(name),
            self.source_type,
            PRIORITY_REGISTRY,
        ))
    }

    fn covers(&self, url: &str) -> bool {
        self.url_patterns.iter().any(|re| re.is_match(url))
    }
}

/// Owner and repository from the first GitHub URL in HOMEPAGE or SRC_URI
pub fn github_repository(meta: &EbuildMetadata) -> Option<(String, String)> {
    [meta.homepage.as_str(), meta.src_uri.as_str()]
        .into_iter()
        .find_map(|text| GITHUB_URL.captures(text))
        .map(|caps| {
            let repo = caps[2].trim_end_matches(".git").trim_end_matches('/');
            (caps[1].to_string(), repo.to_string())
        })
}

/// Builds the priority-ordered list of endpoints that may expose the upstream version.
///
/// An explicit `provided_url` always sorts first. Sources of equal priority keep
/// their discovery order (GitHub, PyPI, npm, crates.io, homepage).
pub fn discover_data_sources(meta: &EbuildMetadata, provided_url: Option<&str>) -> Vec<DataSource> {
    let mut sources = Vec::new();

    if let Some(url) = provided_url.filter(|url| !url.is_empty()) {
        sources.push(DataSource::new(url, SourceType::Provided, PRIORITY_PROVIDED));
    }

    if let Some((owner, repo)) = github_repository(meta) {
        sources.push(DataSource::new(
            format!("https://api.github.com/repos/{owner}/{repo}/releases"),
            SourceType::GitHub,
            PRIORITY_GITHUB,
        ));
    }

    sources.extend(REGISTRIES.iter().filter_map(|registry| registry.discover(meta)));

    if let Some(homepage) = meta.homepage.split_whitespace().next()
        && is_http_url(homepage)
        && !is_covered(homepage, &sources)
    {
        sources.push(DataSource {
            url: homepage.to_string(),
            source_type: SourceType::Homepage,
            priority: PRIORITY_HOMEPAGE,
            content_type: ContentType::Html,
        });
    }

    sources.sort_by_key(|source| source.priority);

    debug!(
        "Discovered {} data sources for {}",
        sources.len(),
        meta.package
    );

    sources
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Whether the URL is already represented by a discovered GitHub or registry source
fn is_covered(url: &str, sources: &[DataSource]) -> bool {
    sources.iter().any(|source| match source.source_type {
        SourceType::GitHub => GITHUB_URL.is_match(url),
        other => REGISTRIES
            .iter()
            .any(|registry| registry.source_type == other && registry.covers(url)),
    })
}
