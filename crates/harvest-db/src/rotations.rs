//! Proxy rotation audit trail. Rows are only ever appended.

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// One exit IP switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRecord {
    /// IP granted by the provider
    pub new_ip: String,
    /// IP in use before the switch, if known
    pub previous_ip: Option<String>,
    /// Provider status text after tag stripping
    pub raw_status: String,
    /// Why the refresh that rotated was requested
    pub reason: String,
    /// Identity of the process that rotated
    pub process: String,
    /// RFC3339 time of the switch
    pub recorded_at: String,
}

/// Append a rotation record.
pub async fn append(pool: &Pool<Sqlite>, record: &RotationRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO proxy_rotations (new_ip, previous_ip, raw_status, reason, process, recorded_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.new_ip)
    .bind(&record.previous_ip)
    .bind(&record.raw_status)
    .bind(&record.reason)
    .bind(&record.process)
    .bind(&record.recorded_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent rotations, newest first.
pub async fn recent(pool: &Pool<Sqlite>, limit: i64) -> Result<Vec<RotationRecord>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT new_ip, previous_ip, raw_status, reason, process, recorded_at
         FROM proxy_rotations ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RotationRecord {
            new_ip: row.get("new_ip"),
            previous_ip: row.get("previous_ip"),
            raw_status: row.get("raw_status"),
            reason: row.get("reason"),
            process: row.get("process"),
            recorded_at: row.get("recorded_at"),
        })
        .collect())
}
