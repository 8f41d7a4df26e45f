//! Synchronous extraction strategies (structured path, pattern and markup)

use regex::Regex;
use scraper::{Html, Selector};

use crate::config::MAX_VERSION_HISTORY;
use crate::extract::error::ExtractionError;
use crate::extract::jsonpath::JsonPath;
use crate::extract::schema::{HistoryLocator, MarkupLocator};
use crate::extract::xpath::XPath;

/// First string or number at `path` in a JSON document
pub fn extract_json(content: &str, path: &str) -> Result<String, ExtractionError> {
    let path = JsonPath::parse(path)?;
    let document: serde_json::Value = serde_json::from_str(content)?;
    path.first_version(&document).map(|v| v.trim().to_string())
}

/// First capture group of the first match of `pattern`
pub fn extract_regex(content: &str, pattern: &str) -> Result<String, ExtractionError> {
    let re = Regex::new(pattern)?;
    first_capture(&re, content)?.ok_or_else(|| ExtractionError::NoMatch(pattern.to_string()))
}

fn first_capture(re: &Regex, text: &str) -> Result<Option<String>, ExtractionError> {
    if re.captures_len() < 2 {
        return Err(ExtractionError::NoCaptureGroup(re.as_str().to_string()));
    }
    Ok(re
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string()))
}

/// Text of the first element matched by `locator`, refined by `pattern` when it matches
pub fn extract_html(
    content: &str,
    locator: &MarkupLocator,
    pattern: Option<&str>,
) -> Result<String, ExtractionError> {
    let refine = pattern.map(Regex::new).transpose()?;
    let document = Html::parse_document(content);

    let text = select_texts(&document, locator, 1)?
        .into_iter()
        .next()
        .ok_or_else(|| ExtractionError::NoElements(locator.expression().to_string()))?;

    refine_text(refine.as_ref(), text)
}

fn refine_text(refine: Option<&Regex>, text: String) -> Result<String, ExtractionError> {
    match refine {
        Some(re) => Ok(first_capture(re, &text)?.unwrap_or(text)),
        None => Ok(text),
    }
}

/// Trimmed, non-empty texts of up to `limit` matched elements in document order
fn select_texts(
    document: &Html,
    locator: &MarkupLocator,
    limit: usize,
) -> Result<Vec<String>, ExtractionError> {
    match locator {
        MarkupLocator::Css(selector) => {
            let parsed = Selector::parse(selector).map_err(|e| ExtractionError::InvalidSelector {
                selector: selector.clone(),
                reason: format!("{e:?}"),
            })?;
            Ok(document
                .select(&parsed)
                .map(|element| element.text().collect::<String>().trim().to_string())
                .filter(|text| !text.is_empty())
                .take(limit)
                .collect())
        }
        MarkupLocator::XPath(expression) => {
            let mut values = XPath::parse(expression)?.evaluate(document);
            values.truncate(limit);
            Ok(values)
        }
    }
}

/// Up to ten recent versions in source order. Markup items are refined by the
/// locator's pattern when it matches.
pub fn extract_history(
    content: &str,
    locator: &HistoryLocator,
) -> Result<Vec<String>, ExtractionError> {
    let versions = match locator {
        HistoryLocator::Json(path) => {
            let path = JsonPath::parse(path)?;
            let document: serde_json::Value = serde_json::from_str(content)?;
            path.versions(&document, MAX_VERSION_HISTORY)
        }
        HistoryLocator::Css { selector, pattern } => markup_history(
            content,
            &MarkupLocator::Css(selector.clone()),
            pattern.as_deref(),
        )?,
        HistoryLocator::XPath {
            expression,
            pattern,
        } => markup_history(
            content,
            &MarkupLocator::XPath(expression.clone()),
            pattern.as_deref(),
        )?,
    };

    if versions.is_empty() {
        return Err(ExtractionError::NoVersions);
    }
    Ok(versions)
}

fn markup_history(
    content: &str,
    locator: &MarkupLocator,
    pattern: Option<&str>,
) -> Result<Vec<String>, ExtractionError> {
    let refine = pattern.map(Regex::new).transpose()?;
    select_texts(&Html::parse_document(content), locator, MAX_VERSION_HISTORY)?
        .into_iter()
        .map(|text| refine_text(refine.as_ref(), text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DOWNLOADS: &str = r#"<html><body>
        <h2 class="latest">Latest release: tool-4.5.6</h2>
        <table id="releases">
          <tr><td class="ver">4.5.6</td></tr>
          <tr><td class="ver">4.5.5</td></tr>
          <tr><td class="ver"> </td></tr>
          <tr><td class="ver">4.4.0</td></tr>
        </table>
    </body></html>"#;

    #[test]
    fn extract_json_reads_path() {
        let content = r#"{"info": {"version": " 2.31.0 "}}"#;

        assert_eq!(extract_json(content, "info.version").unwrap(), "2.31.0");
    }

    #[test]
    fn extract_json_rejects_non_json_content() {
        assert!(matches!(
            extract_json("<html></html>", "info.version"),
            Err(ExtractionError::InvalidJson(_))
        ));
    }

    #[test]
    fn extract_regex_returns_first_capture() {
        let content = "# Maintainer\npkgver=1.2.3\npkgver=9.9.9\n";

        assert_eq!(
            extract_regex(content, r"pkgver=([0-9.]+)").unwrap(),
            "1.2.3"
        );
    }

    #[rstest]
    #[case::no_match("nothing here", r"pkgver=([0-9.]+)")]
    fn extract_regex_reports_no_match(#[case] content: &str, #[case] pattern: &str) {
        assert!(matches!(
            extract_regex(content, pattern),
            Err(ExtractionError::NoMatch(_))
        ));
    }

    #[test]
    fn extract_regex_requires_capture_group() {
        assert!(matches!(
            extract_regex("1.2.3", r"\d+\.\d+"),
            Err(ExtractionError::NoCaptureGroup(_))
        ));
    }

    #[test]
    fn extract_regex_reports_invalid_pattern() {
        assert!(matches!(
            extract_regex("x", r"(unclosed"),
            Err(ExtractionError::InvalidPattern(_))
        ));
    }

    #[rstest]
    #[case::css(MarkupLocator::Css("td.ver".into()), None, "4.5.6")]
    #[case::xpath(MarkupLocator::XPath("//td[@class='ver']".into()), None, "4.5.6")]
    #[case::css_refined(MarkupLocator::Css("h2.latest".into()), Some(r"tool-([\d.]+)"), "4.5.6")]
    #[case::refine_without_match(MarkupLocator::Css("h2.latest".into()), Some(r"v(\d+)"), "Latest release: tool-4.5.6")]
    fn extract_html_selects_first_element(
        #[case] locator: MarkupLocator,
        #[case] pattern: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(extract_html(DOWNLOADS, &locator, pattern).unwrap(), expected);
    }

    #[test]
    fn extract_html_reports_no_elements() {
        assert!(matches!(
            extract_html(DOWNLOADS, &MarkupLocator::Css("span.version".into()), None),
            Err(ExtractionError::NoElements(_))
        ));
    }

    #[test]
    fn extract_html_reports_invalid_selector() {
        assert!(matches!(
            extract_html(DOWNLOADS, &MarkupLocator::Css("td[".into()), None),
            Err(ExtractionError::InvalidSelector { .. })
        ));
    }

    #[rstest]
    #[case::css(HistoryLocator::Css { selector: "td.ver".into(), pattern: None })]
    #[case::xpath(HistoryLocator::XPath { expression: "//table[@id='releases']//td".into(), pattern: None })]
    fn extract_history_skips_blank_cells(#[case] locator: HistoryLocator) {
        assert_eq!(
            extract_history(DOWNLOADS, &locator).unwrap(),
            vec!["4.5.6", "4.5.5", "4.4.0"]
        );
    }

    #[rstest]
    #[case::css(HistoryLocator::Css {
        selector: "li".into(),
        pattern: Some(r"tool-([\d.]+)".into()),
    })]
    #[case::xpath(HistoryLocator::XPath {
        expression: "//ul/li".into(),
        pattern: Some(r"tool-([\d.]+)".into()),
    })]
    fn extract_history_refines_items_with_pattern(#[case] locator: HistoryLocator) {
        let content = "<ul><li>Release tool-4.5.6</li><li>Release tool-4.5.5</li><li>nightly</li></ul>";

        assert_eq!(
            extract_history(content, &locator).unwrap(),
            vec!["4.5.6", "4.5.5", "nightly"]
        );
    }

    #[test]
    fn extract_history_reports_invalid_pattern() {
        let locator = HistoryLocator::Css {
            selector: "li".into(),
            pattern: Some("(unclosed".into()),
        };

        assert!(matches!(
            extract_history("<ul><li>1.0</li></ul>", &locator),
            Err(ExtractionError::InvalidPattern(_))
        ));
    }

    #[test]
    fn extract_history_from_json_is_bounded() {
        let tags: Vec<String> = (0..12).map(|i| format!(r#"{{"tag_name": "v1.{i}"}}"#)).collect();
        let content = format!("[{}]", tags.join(","));

        let versions = extract_history(&content, &HistoryLocator::Json("[*].tag_name".into())).unwrap();

        assert_eq!(versions.len(), MAX_VERSION_HISTORY);
        assert_eq!(versions[0], "v1.0");
        assert_eq!(versions[9], "v1.9");
    }

    #[test]
    fn extract_history_reports_empty_result() {
        assert!(matches!(
            extract_history("[]", &HistoryLocator::Json("[*].tag_name".into())),
            Err(ExtractionError::NoVersions)
        ));
    }
}
