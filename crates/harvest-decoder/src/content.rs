//! Content page extraction.
//!
//! The content endpoint answers with a script that embeds two pieces: a
//! `JSON.stringify({...})` call carrying the case info and a quoted JSON
//! document whose `Html` field is the judgment body.

use crate::error::{DecodeError, Result};
use serde_json::Value;
use tracing::{debug, warn};

const CASE_INFO_START: &str = "stringify({";
const CASE_INFO_END: &str = "});";
const HTML_START: &str = r#"\"Html\":\""#;
const HTML_END: &str = r#"\"}";"#;

/// Stored content of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocContent {
    /// Case info object as served
    pub case_info: String,
    /// Judgment body, still escaped as in the page
    pub content: String,
    /// `案件类型` from the case info, 0 when absent
    pub case_type_code: i64,
    /// `法院ID` from the case info, 0 when absent
    pub court_id: i64,
}

/// Pull case info and body out of a valid content page.
pub fn extract_content(source: &str) -> Result<DocContent> {
    let data = source
        .replace("<html><head></head><body>", "")
        .replace("</body></html>", "");

    let begin = data
        .find(CASE_INFO_START)
        .ok_or_else(|| DecodeError::Malformed("can't find stringify({".to_string()))?;
    let end = data[begin..]
        .find(CASE_INFO_END)
        .map(|i| begin + i)
        .ok_or_else(|| DecodeError::Malformed("can't find caseinfo end".to_string()))?;
    // keep the braces, drop `stringify(` and `);`
    let case_info = &data[begin + CASE_INFO_START.len() - 1..=end];
    debug!("caseinfo script: {}", case_info);

    let info: Value = serde_json::from_str(case_info)
        .map_err(|e| DecodeError::Malformed(format!("invalid caseinfo json data: {e}")))?;
    let case_type_code = int_field(&info, "案件类型");
    let court_id = int_field(&info, "法院ID");

    let begin = data
        .find(HTML_START)
        .ok_or_else(|| DecodeError::Malformed("can't find jsonHtmlData".to_string()))?;
    let body_start = begin + HTML_START.len();
    let end = data[body_start..]
        .find(HTML_END)
        .map(|i| body_start + i)
        .ok_or_else(|| DecodeError::Malformed("can't find jsonHtmlData end".to_string()))?;

    Ok(DocContent {
        case_info: case_info.to_string(),
        content: data[body_start..end].to_string(),
        case_type_code,
        court_id,
    })
}

fn int_field(info: &Value, name: &str) -> i64 {
    let parsed = match info.get(name) {
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        warn!("get {} failed from caseinfo", name);
        0
    })
}
