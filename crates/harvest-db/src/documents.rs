//! Document rows: the summary written from list results and the content
//! written by the document fetch.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// Summary of one document as listed by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Decrypted document identifier
    pub doc_id: String,
    /// Case name
    pub title: String,
    /// Court name
    pub court: String,
    /// Case number
    pub case_number: String,
    /// Judgment date as published
    pub judge_date: String,
    /// Normalized case-type label
    pub case_type: String,
}

/// Full content of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    /// Embedded HTML body
    pub content: String,
    /// Case-info JSON object as published
    pub case_info: String,
    /// Numeric case-type code (0 when unknown)
    pub case_type_code: i64,
    /// Numeric court id (0 when unknown)
    pub court_id: i64,
}

/// Insert a summary or refresh its listed fields. Content is never touched.
pub async fn upsert_summary(pool: &Pool<Sqlite>, summary: &DocumentSummary) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO documents (doc_id, title, court, case_number, judge_date, case_type, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(doc_id) DO UPDATE SET
             title = excluded.title,
             court = excluded.court,
             case_number = excluded.case_number,
             judge_date = excluded.judge_date,
             case_type = excluded.case_type,
             updated_at = excluded.updated_at",
    )
    .bind(&summary.doc_id)
    .bind(&summary.title)
    .bind(&summary.court)
    .bind(&summary.case_number)
    .bind(&summary.judge_date)
    .bind(&summary.case_type)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Store fetched content, creating a bare row when no summary exists yet.
pub async fn update_content(
    pool: &Pool<Sqlite>,
    doc_id: &str,
    content: &DocumentContent,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO documents (doc_id, content, case_info, case_type_code, court_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(doc_id) DO UPDATE SET
             content = excluded.content,
             case_info = excluded.case_info,
             case_type_code = excluded.case_type_code,
             court_id = excluded.court_id,
             updated_at = excluded.updated_at",
    )
    .bind(doc_id)
    .bind(&content.content)
    .bind(&content.case_info)
    .bind(content.case_type_code)
    .bind(content.court_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

/// True when content for `doc_id` is already stored.
pub async fn is_content_fetched(pool: &Pool<Sqlite>, doc_id: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents WHERE doc_id = ? AND content IS NOT NULL",
    )
    .bind(doc_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// True when a document with this case number and title already has content.
pub async fn is_content_fetched_by_case(
    pool: &Pool<Sqlite>,
    case_number: &str,
    title: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents
         WHERE case_number = ? AND title = ? AND content IS NOT NULL",
    )
    .bind(case_number)
    .bind(title)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Load a summary by id.
pub async fn get_summary(
    pool: &Pool<Sqlite>,
    doc_id: &str,
) -> Result<Option<DocumentSummary>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT doc_id, title, court, case_number, judge_date, case_type
         FROM documents WHERE doc_id = ?",
    )
    .bind(doc_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| DocumentSummary {
        doc_id: row.get("doc_id"),
        title: row.get("title"),
        court: row.get("court"),
        case_number: row.get("case_number"),
        judge_date: row.get("judge_date"),
        case_type: row.get("case_type"),
    }))
}
