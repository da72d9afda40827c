//! List endpoint tasks.
//!
//! One task is one page of one query. The first page of a query also decides
//! what else to request: the remaining pages inside the result window, and
//! narrower queries when the window cannot hold the whole result set.

use crate::client::ListApiClient;
use crate::error::Result;
use crate::outcome::HandlerOutcome;
use harvest_core::{decode_value, encode_value};
use harvest_db::{DocumentSummary, Store};
use harvest_decoder::{decrypt, Classification, Classifier, DecodeError, ListPage, ResultRecord};
use harvest_query::{subdivide, PagePlan, QueryDescriptor};
use harvest_queue::{ListApiTask, Task, TaskSink};
use harvest_session::SessionScheduler;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ListApiHandler {
    session: Arc<SessionScheduler>,
    client: ListApiClient,
    classifier: Arc<Classifier>,
    store: Arc<dyn Store>,
    sink: Arc<dyn TaskSink>,
}

impl ListApiHandler {
    pub fn new(
        session: Arc<SessionScheduler>,
        client: ListApiClient,
        classifier: Arc<Classifier>,
        store: Arc<dyn Store>,
        sink: Arc<dyn TaskSink>,
    ) -> Self {
        Self {
            session,
            client,
            classifier,
            store,
            sink,
        }
    }

    /// Fetch, classify and decrypt one page, then schedule its follow-ups.
    pub async fn handle(&self, task: &ListApiTask) -> Result<HandlerOutcome> {
        let query = decode_value(&task.param).unwrap_or_else(|_| task.param.clone());
        debug!(param = %query, index = %task.index, "list api task");

        let Some(credentials) = self.session.acquire().await else {
            warn!("session is not initialized");
            return Ok(HandlerOutcome::refresh("session is not initialized"));
        };

        let response = match self.client.fetch(task, &credentials).await {
            Ok(response) => response,
            Err(e) => {
                warn!(param = %query, index = %task.index, "exception at call url: {}", e);
                return Ok(HandlerOutcome::Retry);
            }
        };

        let payload = match self
            .classifier
            .classify(response.status, &response.body, response.title())
        {
            Classification::Valid(payload) => payload,
            Classification::Empty => {
                info!(param = %query, index = %task.index, "there is no result for this search param");
                return Ok(HandlerOutcome::Done);
            }
            Classification::RateLimited => {
                warn!(status = response.status, "list request throttled, try again later");
                return Ok(HandlerOutcome::Retry);
            }
            Classification::ChallengeRequired => {
                warn!("list page need verification");
                return Ok(HandlerOutcome::refresh("list page need verification"));
            }
            Classification::StaleSession => {
                warn!("invalid key, data is {}", response.body);
                return Ok(HandlerOutcome::refresh(
                    "list page remind key, page need refresh",
                ));
            }
            Classification::SystemError { needs_refresh } => {
                warn!("invalid result: {}", response.body);
                if !needs_refresh {
                    return Ok(HandlerOutcome::Retry);
                }
                let reason = self
                    .classifier
                    .refresh_reason(response.title(), &response.body)
                    .unwrap_or("list page javascript error, need refresh");
                return Ok(HandlerOutcome::refresh(reason));
            }
        };

        let decoded = {
            let _browser = self.session.acquire_browser().await;
            let evaluator = self.session.evaluator();
            decrypt(evaluator.as_ref(), &payload).await
        };

        let page = match decoded {
            Ok(page) => page,
            Err(DecodeError::SessionFault(reason)) => {
                warn!("decrypt docid failed: {}", reason);
                return Ok(HandlerOutcome::refresh(
                    "list page javascript error, decrypt docid failed",
                ));
            }
            Err(DecodeError::Retryable(reason)) => {
                warn!(param = %query, index = %task.index, "list api result is empty: {}", reason);
                return Ok(HandlerOutcome::Retry);
            }
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(e) => {
                warn!(param = %query, index = %task.index, "decrypt failed, keep raw data: {}", e);
                self.store
                    .insert_raw_payload(&query, &task.index, &payload)
                    .await?;
                return Ok(HandlerOutcome::Done);
            }
        };

        let queued = ingest(self.store.as_ref(), self.sink.as_ref(), &page).await?;
        info!(
            count = page.count,
            records = page.records.len(),
            queued,
            "list page stored"
        );

        if task.is_first_page() {
            self.schedule_follow_ups(task, &query, page.count);
        }
        Ok(HandlerOutcome::Done)
    }

    fn schedule_follow_ups(&self, task: &ListApiTask, query: &str, count: u64) {
        let plan = PagePlan::new(count, 1);

        let pages = plan.next_pages();
        if !pages.is_empty() {
            info!(param = %query, last = pages.end(), "try to generate next pages request");
            for page in pages {
                self.sink
                    .push(Task::ListApi(ListApiTask::new(task.param.clone(), page)));
            }
        }

        if plan.should_subdivide() {
            info!(param = %query, count, "try to subdivide request");
            match QueryDescriptor::split(query).and_then(|parent| subdivide(&parent)) {
                Ok(children) => {
                    for child in children {
                        let joined = child.join();
                        info!("add new list task. {}", joined);
                        // first page only; its own pages follow when it runs
                        self.sink
                            .push(Task::ListApi(ListApiTask::new(encode_value(&joined), 1)));
                    }
                }
                Err(e) => warn!(param = %query, "query can't be narrowed further: {}", e),
            }
        }
    }
}

/// Store every record of `page` and queue content fetches for the ones
/// without content. Returns the number of queued fetches.
pub async fn ingest(store: &dyn Store, sink: &dyn TaskSink, page: &ListPage) -> Result<usize> {
    let mut queued = 0;
    for record in &page.records {
        store.upsert_summary(&summary(record)).await?;
        if store.is_content_fetched(&record.doc_id).await? {
            debug!(doc_id = %record.doc_id, "doc already got");
            continue;
        }
        sink.push(Task::DocApi(record.doc_id.as_str().to_string()));
        queued += 1;
    }
    Ok(queued)
}

fn summary(record: &ResultRecord) -> DocumentSummary {
    DocumentSummary {
        doc_id: record.doc_id.as_str().to_string(),
        title: record.title.clone(),
        court: record.court.clone(),
        case_number: record.case_number.clone(),
        judge_date: record.judge_date.clone(),
        case_type: record.case_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, Harness, ScriptedBrowser, ScriptedEvaluator};
    use harvest_core::{DocId, SiteConfig};
    use harvest_db::DocumentContent;
    use harvest_queue::Tag;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_1: &str = "a34b1ced-9c80-4509-b353-0588bbb88b5e";
    const DOC_2: &str = "b7c2d9e0-1f3a-4b5c-8d6e-7f8091a2b3c4";

    fn evaluator() -> ScriptedEvaluator {
        ScriptedEvaluator::default()
            .id("enc-1", DOC_1)
            .id("enc-2", DOC_2)
            .payload("PAYLOAD-45", listing("45", &["enc-1", "enc-2"]))
            .payload("PAYLOAD-350", listing("350", &["enc-1"]))
            .payload("PAYLOAD-FAULT", listing("12", &["FAULT"]))
            .payload("PAYLOAD-NOCOUNT", json!([{ "RunEval": "x" }]))
    }

    fn listing(count: &str, ids: &[&str]) -> serde_json::Value {
        let mut items = vec![json!({ "Count": count })];
        for id in ids {
            items.push(json!({
                "文书ID": id,
                "案件名称": "张某盗窃案",
                "法院名称": "北京市第一中级人民法院",
                "案号": "（2019）京01刑终100号",
                "裁判日期": "2019-06-20",
                "案件类型": "1",
                "审判程序": "二审",
            }));
        }
        json!(items)
    }

    async fn setup(body: &str, status: u16) -> (MockServer, Harness, ListApiHandler) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/List/ListContent"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;

        let h = harness(ScriptedBrowser::default(), evaluator()).await;
        let site = SiteConfig {
            base_url: server.uri(),
            ..SiteConfig::default()
        };
        let client = ListApiClient::new(&site, None, Duration::from_secs(5)).expect("client");
        let handler = ListApiHandler::new(
            h.session.clone(),
            client,
            Arc::new(Classifier::default()),
            h.store.clone(),
            h.sink.clone(),
        );
        (server, h, handler)
    }

    fn first_page() -> ListApiTask {
        ListApiTask::new(encode_value("案件类型:刑事案件"), 1)
    }

    fn list_tasks(tasks: &[Task]) -> Vec<ListApiTask> {
        tasks
            .iter()
            .filter_map(|t| match t {
                Task::ListApi(task) => Some(task.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_first_page_schedules_docs_and_pages() {
        let (_server, h, handler) = setup("PAYLOAD-45", 200).await;

        let outcome = handler.handle(&first_page()).await.expect("handle");
        assert_eq!(outcome, HandlerOutcome::Done);

        let tasks = h.sink.tasks();
        assert_eq!(tasks[0], Task::DocApi(DOC_1.to_string()));
        assert_eq!(tasks[1], Task::DocApi(DOC_2.to_string()));

        let pages: Vec<String> = list_tasks(&tasks).into_iter().map(|t| t.index).collect();
        assert_eq!(pages, vec!["2", "3", "4", "5"]);
        assert!(list_tasks(&tasks).iter().all(|t| t.param == first_page().param));
    }

    #[tokio::test]
    async fn test_later_page_schedules_nothing_more() {
        let (_server, h, handler) = setup("PAYLOAD-45", 200).await;

        let task = ListApiTask::new(first_page().param, 3);
        assert_eq!(handler.handle(&task).await.unwrap(), HandlerOutcome::Done);
        assert!(h.sink.tasks().iter().all(|t| t.tag() == Tag::ApiDoc));
    }

    #[tokio::test]
    async fn test_oversized_query_is_subdivided_by_document_type() {
        let (_server, h, handler) = setup("PAYLOAD-350", 200).await;

        handler.handle(&first_page()).await.expect("handle");

        let children: Vec<String> = list_tasks(&h.sink.tasks())
            .into_iter()
            .filter(|t| t.param != first_page().param)
            .map(|t| {
                assert!(t.is_first_page());
                decode_value(&t.param).unwrap()
            })
            .collect();
        assert_eq!(children.len(), 10);
        assert!(children
            .iter()
            .all(|c| c.starts_with("案件类型:刑事案件,文书类型:")));
        assert!(children.iter().all(|c| !c.contains("页码")));
    }

    #[tokio::test]
    async fn test_fetched_documents_are_not_queued_again() {
        let (_server, h, handler) = setup("PAYLOAD-45", 200).await;
        let content = DocumentContent {
            content: "<p>正文</p>".to_string(),
            case_info: "{}".to_string(),
            case_type_code: 1,
            court_id: 0,
        };
        h.store
            .update_content(&DocId::new(DOC_1).unwrap(), &content)
            .await
            .unwrap();

        let task = ListApiTask::new(first_page().param, 2);
        handler.handle(&task).await.expect("handle");
        assert_eq!(h.sink.tasks(), vec![Task::DocApi(DOC_2.to_string())]);
    }

    #[tokio::test]
    async fn test_stale_key_asks_for_refresh() {
        let (_server, _h, handler) = setup("\"remind key\"", 200).await;
        assert_eq!(
            handler.handle(&first_page()).await.unwrap(),
            HandlerOutcome::RetryAfterRefresh("list page remind key, page need refresh".to_string())
        );
    }

    #[tokio::test]
    async fn test_throttled_response_is_retried_without_refresh() {
        let (_server, h, handler) = setup("", 429).await;
        assert_eq!(
            handler.handle(&first_page()).await.unwrap(),
            HandlerOutcome::Retry
        );
        assert!(h.sink.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_challenge_page_asks_for_refresh() {
        let (_server, _h, handler) =
            setup("<html><head><title>访问验证</title></head></html>", 200).await;
        assert_eq!(
            handler.handle(&first_page()).await.unwrap(),
            HandlerOutcome::RetryAfterRefresh("list page need verification".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_html_page_is_retried() {
        let (_server, _h, handler) = setup("<html><body>系统繁忙</body></html>", 200).await;
        assert_eq!(
            handler.handle(&first_page()).await.unwrap(),
            HandlerOutcome::Retry
        );
    }

    #[tokio::test]
    async fn test_empty_answer_is_done() {
        let (_server, h, handler) = setup("[]", 200).await;
        assert_eq!(
            handler.handle(&first_page()).await.unwrap(),
            HandlerOutcome::Done
        );
        assert!(h.sink.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_missing_count_is_retried() {
        let (_server, _h, handler) = setup("PAYLOAD-NOCOUNT", 200).await;
        assert_eq!(
            handler.handle(&first_page()).await.unwrap(),
            HandlerOutcome::Retry
        );
    }

    #[tokio::test]
    async fn test_script_fault_abandons_batch() {
        let (_server, h, handler) = setup("PAYLOAD-FAULT", 200).await;
        assert_eq!(
            handler.handle(&first_page()).await.unwrap(),
            HandlerOutcome::RetryAfterRefresh(
                "list page javascript error, decrypt docid failed".to_string()
            )
        );
        assert!(h.sink.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_parked() {
        let (_server, h, handler) = setup("PAYLOAD-UNKNOWN", 200).await;
        assert_eq!(
            handler.handle(&first_page()).await.unwrap(),
            HandlerOutcome::Done
        );

        let parked = h.store.list_raw_payloads(0, 10).await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].param, "案件类型:刑事案件");
        assert_eq!(parked[0].page_index, "1");
        assert_eq!(parked[0].data, "PAYLOAD-UNKNOWN");
    }
}
