//! Variable and dependency parsing for recipe files

/// Archive markers in SRC_URI that suggest a prebuilt upstream binary
const BINARY_ARCHIVE_MARKERS: &[&str] = &[
    ".deb",
    ".rpm",
    ".AppImage",
    ".tar.gz",
    ".tar.xz",
    ".zip",
    "linux64",
    "linux-x64",
    "linux-amd64",
];

/// Reads a `NAME="..."` assignment that may span several lines.
///
/// The assignment is recognised only when `NAME=` starts the trimmed line, so
/// `DEPEND` never matches `RDEPEND=` or `BDEPEND=`. Continuation lines are
/// trimmed and joined with single spaces. Returns an empty string when absent.
pub fn extract_multiline_var(content: &str, name: &str) -> String {
    let prefix = format!("{name}=");
    let mut lines = content.lines();

    let (quote, first) = loop {
        let Some(line) = lines.next() else {
            return String::new();
        };
        let Some(rest) = line.trim_start().strip_prefix(&prefix) else {
            continue;
        };
        match rest.chars().next() {
            Some(q @ ('"' | '\'')) => break (q, &rest[1..]),
            Some(_) => return rest.trim().to_string(),
            None => continue,
        }
    };

    if let Some(end) = first.find(quote) {
        return first[..end].trim().to_string();
    }

    let mut value = String::from(first);
    value.push(' ');
    for line in lines {
        if let Some(end) = line.find(quote) {
            value.push_str(&line[..end]);
            return value.trim().to_string();
        }
        value.push_str(line.trim());
        value.push(' ');
    }

    // Unterminated quote: keep what was accumulated.
    value.trim().to_string()
}

/// Collects dependency atoms from DEPEND then RDEPEND, deduplicated in first-seen order
pub fn extract_dependencies(content: &str) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    for var in ["DEPEND", "RDEPEND"] {
        for atom in parse_dependency_string(&extract_multiline_var(content, var)) {
            if !deps.contains(&atom) {
                deps.push(atom);
            }
        }
    }
    deps
}

/// Splits a dependency expression into `category/name` atoms.
///
/// USE conditionals (`foo?`), grouping parentheses and `||` are dropped.
pub fn parse_dependency_string(deps: &str) -> Vec<String> {
    deps.split_whitespace()
        .filter(|token| !token.ends_with('?') && !matches!(*token, "||" | "(" | ")"))
        .filter_map(extract_package_atom)
        .collect()
}

/// Reduces `>=dev-python/foo-1.2:0[bar]` to `dev-python/foo`.
///
/// Returns `None` for tokens without a category.
pub fn extract_package_atom(token: &str) -> Option<String> {
    let atom = token.trim_start_matches(['>', '=', '<', '~', '!']);
    let slash = atom.find('/')?;

    let bytes = atom.as_bytes();
    let end = (slash + 1..bytes.len())
        .find(|&i| match bytes[i] {
            b':' | b'[' => true,
            b'-' => bytes.get(i + 1).is_some_and(u8::is_ascii_digit),
            _ => false,
        })
        .unwrap_or(bytes.len());

    Some(atom[..end].to_string())
}

/// Best-effort detection of prebuilt binary packages.
///
/// `RESTRICT` containing `bindist` is decisive. Otherwise a binary archive
/// marker in SRC_URI counts only together with a `-bin` naming convention.
pub fn detect_binary_package(content: &str) -> bool {
    if extract_multiline_var(content, "RESTRICT").contains("bindist") {
        return true;
    }

    let src_uri = extract_multiline_var(content, "SRC_URI");
    let has_marker = BINARY_ARCHIVE_MARKERS
        .iter()
        .any(|marker| src_uri.contains(marker));

    has_marker && (content.contains("PN}-bin") || content.contains("-bin-"))
}

/// Version part of a recipe file stem: everything after the last `-` followed by a digit
pub fn version_from_file_stem(stem: &str) -> Option<&str> {
    let bytes = stem.as_bytes();
    (0..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
        .map(|i| &stem[i + 1..])
}
