//! Parked list payloads that failed to decode.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// One undecoded list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPayload {
    /// Row id
    pub id: i64,
    /// Decoded query descriptor the payload answered
    pub param: String,
    /// Page index of the request
    pub page_index: String,
    /// Response body as received
    pub data: String,
    /// When the payload was parked
    pub created_at: String,
}

/// Park a payload; returns its row id.
pub async fn insert(
    pool: &Pool<Sqlite>,
    param: &str,
    page_index: &str,
    data: &str,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO raw_payloads (param, page_index, data, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(param)
    .bind(page_index)
    .bind(data)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Page through parked payloads, oldest first.
pub async fn list(pool: &Pool<Sqlite>, offset: i64, limit: i64) -> Result<Vec<RawPayload>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, param, page_index, data, created_at FROM raw_payloads
         ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RawPayload {
            id: row.get("id"),
            param: row.get("param"),
            page_index: row.get("page_index"),
            data: row.get("data"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Remove a parked payload. Returns false when it was already gone.
pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM raw_payloads WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_park_list_delete() {
        let db = Database::connect(":memory:").await.expect("open database");
        db.run_migrations().await.expect("run migrations");

        let first = insert(db.pool(), "案件类型:刑事案件", "1", "[{\"RunEval\":\"x\"}]")
            .await
            .expect("insert");
        let second = insert(db.pool(), "案件类型:民事案件", "2", "\"remind\"")
            .await
            .expect("insert");
        assert!(second > first);

        let page = list(db.pool(), 0, 10).await.expect("list");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].param, "案件类型:刑事案件");
        assert_eq!(page[1].page_index, "2");

        let tail = list(db.pool(), 1, 10).await.expect("list offset");
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id, second);

        assert!(delete(db.pool(), first).await.expect("delete"));
        assert!(!delete(db.pool(), first).await.expect("delete twice"));
        assert_eq!(list(db.pool(), 0, 10).await.expect("list").len(), 1);
    }
}
