//! List payload decryption.
//!
//! A payload evaluates to an array whose first element carries `Count` (and
//! possibly a `RunEval` section the evaluator expands) and whose remaining
//! elements are records with an obfuscated `文书ID`.

use crate::case_type::normalize_case_type;
use crate::error::{DecodeError, Result};
use harvest_browser::{ScriptError, ScriptEvaluator};
use harvest_core::DocId;
use serde_json::Value;
use tracing::{debug, info, warn};

/// One decoded search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub doc_id: DocId,
    pub title: String,
    pub court: String,
    pub case_number: String,
    pub judge_date: String,
    pub case_type: String,
    /// Total results of the query this record came from
    pub total_count: u64,
}

/// Decoded list page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Total results of the query, across all pages
    pub count: u64,
    pub records: Vec<ResultRecord>,
    /// Records dropped because their identifier could not be decoded
    pub skipped: usize,
}

/// Evaluate `payload` and decrypt every record in it.
///
/// # Errors
/// - [`DecodeError::Retryable`] when the payload has no `Count`
/// - [`DecodeError::SessionFault`] when an identifier routine threw; the
///   whole batch is abandoned
/// - [`DecodeError::Malformed`] or [`DecodeError::Evaluation`] when the
///   payload itself cannot be used
pub async fn decrypt(evaluator: &dyn ScriptEvaluator, payload: &str) -> Result<ListPage> {
    let value = evaluator.decode_payload(payload).await?;
    let items = value
        .as_array()
        .ok_or_else(|| DecodeError::Malformed(format!("expected array, got {value}")))?;
    let head = items
        .first()
        .ok_or_else(|| DecodeError::Malformed("empty payload array".to_string()))?;

    let count = match head.get("Count") {
        None | Some(Value::Null) => {
            return Err(DecodeError::Retryable("list result has no count".to_string()))
        }
        Some(raw) => parse_count(raw)?,
    };
    if count == 0 {
        info!("there is no result for this search param");
        return Ok(ListPage::default());
    }

    info!(count, docs = items.len() - 1, "total list count");
    let mut page = ListPage {
        count,
        ..ListPage::default()
    };
    for item in &items[1..] {
        match decode_record(evaluator, item, count).await {
            Ok(record) => page.records.push(record),
            Err(DecodeError::MalformedRecord(reason)) => {
                warn!("skipping record: {}", reason);
                page.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(page)
}

async fn decode_record(
    evaluator: &dyn ScriptEvaluator,
    item: &Value,
    total_count: u64,
) -> Result<ResultRecord> {
    let field = |name: &str| item.get(name).and_then(Value::as_str).unwrap_or_default();

    let obfuscated = field("文书ID");
    if obfuscated.is_empty() {
        return Err(DecodeError::MalformedRecord("record without 文书ID".to_string()));
    }

    debug!("try to decrypt docId {}", obfuscated);
    let doc_id = match evaluator.decode_doc_id(obfuscated).await {
        Ok(id) => id,
        Err(ScriptError::MalformedEncoding(msg) | ScriptError::UnexpectedValue(msg)) => {
            return Err(DecodeError::MalformedRecord(msg))
        }
        Err(ScriptError::Fault(msg)) => return Err(DecodeError::SessionFault(msg)),
        Err(e) => return Err(DecodeError::Evaluation(e)),
    };

    let doc_id = DocId::new(doc_id).map_err(|e| DecodeError::MalformedRecord(e.to_string()))?;
    let title = field("案件名称").to_string();
    debug!(doc_id = %doc_id, title = %title, "decrypted record");

    Ok(ResultRecord {
        doc_id,
        title,
        court: field("法院名称").to_string(),
        case_number: field("案号").to_string(),
        judge_date: field("裁判日期").to_string(),
        case_type: normalize_case_type(field("案件类型"), field("审判程序")),
        total_count,
    })
}

fn parse_count(raw: &Value) -> Result<u64> {
    let parsed = match raw {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };
    parsed.ok_or_else(|| DecodeError::Malformed(format!("invalid count {raw}")))
}
