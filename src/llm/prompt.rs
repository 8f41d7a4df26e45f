//! Prompt construction and reply parsing shared by all providers

use crate::config::MAX_LLM_CONTENT_CHARS;
use crate::ebuild::EbuildMetadata;
use crate::llm::error::LlmError;
use crate::llm::provider::SchemaAnalysis;

const TRUNCATION_NOTICE: &str = "\n... (truncated)";

/// Content as text, cut at `MAX_LLM_CONTENT_CHARS` characters with a notice appended
pub fn truncate_content(content: &[u8]) -> String {
    let text = String::from_utf8_lossy(content);
    match text.char_indices().nth(MAX_LLM_CONTENT_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_NOTICE}", &text[..cut]),
        None => text.into_owned(),
    }
}

pub fn version_extraction_prompt(content: &[u8], instructions: &str) -> String {
    let mut prompt = String::from("Extract the version number from the following content.\n\n");

    if !instructions.is_empty() {
        prompt.push_str(&format!("Instructions: {instructions}\n\n"));
    }

    prompt.push_str(&format!("Content:\n```\n{}\n```\n\n", truncate_content(content)));
    prompt.push_str(
        "Respond with ONLY the version number (e.g., \"1.2.3\" or \"11.81.1\"). \
         Do not include any other text, explanation, or formatting.",
    );
    prompt
}

pub fn schema_analysis_prompt(content: &[u8], meta: &EbuildMetadata, hint: &str) -> String {
    let mut prompt = String::from(
        "Analyze the following content and suggest the best way to extract version information.\n\n",
    );

    prompt.push_str("Package Information:\n");
    for (label, value) in [
        ("Package", &meta.package),
        ("Current Version", &meta.version),
        ("Homepage", &meta.homepage),
    ] {
        if !value.is_empty() {
            prompt.push_str(&format!("- {label}: {value}\n"));
        }
    }
    prompt.push('\n');

    if !hint.is_empty() {
        prompt.push_str(&format!("User Hint: {hint}\n\n"));
    }

    prompt.push_str(&format!("Content:\n```\n{}\n```\n\n", truncate_content(content)));
    prompt.push_str(
        r#"Respond in JSON format with the following structure:
{
  "parser_type": "json" | "regex" | "html",
  "path": "JSON path if parser_type is json",
  "pattern": "regex pattern if parser_type is regex",
  "selector": "CSS selector if parser_type is html",
  "xpath": "XPath expression if parser_type is html (alternative to selector)",
  "fallback_type": "fallback parser type",
  "fallback_config": "fallback configuration",
  "confidence": 0.0-1.0,
  "reasoning": "explanation of the choice"
}
"#,
    );
    prompt
}

/// Strips decoration models tend to add around a bare version
pub fn clean_version_reply(reply: &str) -> String {
    let reply = reply.trim().trim_matches(['"', '\'', '`']).trim();
    let reply = reply
        .strip_prefix('v')
        .or_else(|| reply.strip_prefix('V'))
        .unwrap_or(reply);
    reply.trim_end_matches(['.', ',', ';', ':']).trim().to_string()
}

/// Parses the JSON object between the first `{` and the last `}` of a reply
pub fn parse_schema_analysis(reply: &str) -> Result<SchemaAnalysis, LlmError> {
    let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) else {
        return Err(LlmError::InvalidResponse(
            "no JSON object found in response".to_string(),
        ));
    };
    if end <= start {
        return Err(LlmError::InvalidResponse(
            "no JSON object found in response".to_string(),
        ));
    }

    serde_json::from_str(&reply[start..=end])
        .map_err(|e| LlmError::InvalidResponse(format!("failed to parse schema analysis: {e}")))
}
