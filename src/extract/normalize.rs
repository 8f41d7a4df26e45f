//! Version string normalization applied before comparison

/// Release prefixes stripped before comparison, longest first so `ver.` wins over `v`
const VERSION_PREFIXES: &[&str] = &[
    "version-", "Version-", "release-", "Release-", "ver-", "Ver-", "ver.", "Ver.", "v", "V",
];

/// Trims whitespace and strips the first matching release prefix
pub fn normalize_version(version: &str) -> &str {
    let version = version.trim();
    VERSION_PREFIXES
        .iter()
        .find_map(|prefix| version.strip_prefix(prefix))
        .unwrap_or(version)
}

/// Whether two version strings denote the same release once normalized
pub fn versions_match(a: &str, b: &str) -> bool {
    normalize_version(a) == normalize_version(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.2.3", "1.2.3")]
    #[case("  1.2.3\n", "1.2.3")]
    #[case("v1.2.3", "1.2.3")]
    #[case("V1.2.3", "1.2.3")]
    #[case("version-1.2", "1.2")]
    #[case("Release-1.2", "1.2")]
    #[case("ver.1.2", "1.2")]
    #[case("Ver-1.2", "1.2")]
    #[case("vv1.2", "v1.2")]
    #[case("release1.2", "release1.2")]
    fn normalize_version_strips_one_prefix(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_version(input), expected);
    }

    #[rstest]
    #[case("v2.31.0", "2.31.0", true)]
    #[case("release-1.0", "v1.0", true)]
    #[case("2.31.0", "2.32.0", false)]
    #[case("1.0", "1.0.0", false)]
    fn versions_match_ignores_prefixes(#[case] a: &str, #[case] b: &str, #[case] expected: bool) {
        assert_eq!(versions_match(a, b), expected);
    }
}
