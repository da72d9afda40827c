//! Storage interface consumed by the harvester core.

use crate::documents::{self, DocumentContent, DocumentSummary};
use crate::error::Result;
use crate::raw_payloads::{self, RawPayload};
use crate::rotations::{self, RotationRecord};
use crate::Database;
use harvest_core::DocId;

/// What the harvester needs from a document store.
///
/// Writes are idempotent so a task delivered twice leaves the same state.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Insert or refresh a document summary
    async fn upsert_summary(&self, summary: &DocumentSummary) -> Result<()>;

    /// True when the document's content is already stored
    async fn is_content_fetched(&self, doc_id: &DocId) -> Result<bool>;

    /// True when a document with this case number and title has content
    async fn is_content_fetched_by_case(&self, case_number: &str, title: &str) -> Result<bool>;

    /// Store fetched document content
    async fn update_content(&self, doc_id: &DocId, content: &DocumentContent) -> Result<()>;

    /// Park an undecodable list payload for later reprocessing
    async fn insert_raw_payload(&self, param: &str, page_index: &str, data: &str) -> Result<i64>;

    /// Page through parked payloads, oldest first
    async fn list_raw_payloads(&self, offset: i64, limit: i64) -> Result<Vec<RawPayload>>;

    /// Drop a parked payload
    async fn delete_raw_payload(&self, id: i64) -> Result<()>;

    /// Append a proxy rotation to the audit trail
    async fn append_rotation(&self, record: &RotationRecord) -> Result<()>;
}

#[async_trait::async_trait]
impl Store for Database {
    async fn upsert_summary(&self, summary: &DocumentSummary) -> Result<()> {
        documents::upsert_summary(self.pool(), summary).await?;
        Ok(())
    }

    async fn is_content_fetched(&self, doc_id: &DocId) -> Result<bool> {
        Ok(documents::is_content_fetched(self.pool(), doc_id.as_str()).await?)
    }

    async fn is_content_fetched_by_case(&self, case_number: &str, title: &str) -> Result<bool> {
        Ok(documents::is_content_fetched_by_case(self.pool(), case_number, title).await?)
    }

    async fn update_content(&self, doc_id: &DocId, content: &DocumentContent) -> Result<()> {
        documents::update_content(self.pool(), doc_id.as_str(), content).await?;
        tracing::debug!(doc_id = %doc_id, "document content stored");
        Ok(())
    }

    async fn insert_raw_payload(&self, param: &str, page_index: &str, data: &str) -> Result<i64> {
        let id = raw_payloads::insert(self.pool(), param, page_index, data).await?;
        tracing::info!(id, param, page_index, "raw list payload parked");
        Ok(id)
    }

    async fn list_raw_payloads(&self, offset: i64, limit: i64) -> Result<Vec<RawPayload>> {
        Ok(raw_payloads::list(self.pool(), offset, limit).await?)
    }

    async fn delete_raw_payload(&self, id: i64) -> Result<()> {
        if !raw_payloads::delete(self.pool(), id).await? {
            tracing::debug!(id, "raw payload already deleted");
        }
        Ok(())
    }

    async fn append_rotation(&self, record: &RotationRecord) -> Result<()> {
        rotations::append(self.pool(), record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_through_trait_object() {
        let db = Database::open(":memory:").await.expect("open database");
        let store: &dyn Store = &db;

        let doc_id = DocId::new("a34b1ced-9c80-4509-b353-0588bbb88b5e").expect("valid id");
        store
            .upsert_summary(&DocumentSummary {
                doc_id: doc_id.as_str().to_string(),
                title: "李某合同纠纷案".to_string(),
                court: "上海市第一中级人民法院".to_string(),
                case_number: "（2019）沪01民终1号".to_string(),
                judge_date: "2019-03-01".to_string(),
                case_type: "民事".to_string(),
            })
            .await
            .expect("upsert");
        assert!(!store.is_content_fetched(&doc_id).await.expect("check"));

        store
            .update_content(
                &doc_id,
                &DocumentContent {
                    content: "<p>正文</p>".to_string(),
                    case_info: "{}".to_string(),
                    case_type_code: 2,
                    court_id: 0,
                },
            )
            .await
            .expect("update");
        assert!(store.is_content_fetched(&doc_id).await.expect("check"));

        let id = store
            .insert_raw_payload("案件类型:民事案件", "1", "[]")
            .await
            .expect("park");
        assert_eq!(store.list_raw_payloads(0, 10).await.expect("list").len(), 1);
        store.delete_raw_payload(id).await.expect("delete");
        store.delete_raw_payload(id).await.expect("delete is idempotent");
        assert!(store.list_raw_payloads(0, 10).await.expect("list").is_empty());
    }
}
