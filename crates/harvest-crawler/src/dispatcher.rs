//! Routes queue tasks to their handlers and applies the outcome.

use crate::doc_api::DocApiHandler;
use crate::error::Result;
use crate::list_api::ListApiHandler;
use crate::outcome::HandlerOutcome;
use crate::pages::{LoggingPageCrawler, PageCrawler};
use harvest_core::counter::DEFAULT_CAPACITY;
use harvest_core::{AppConfig, Attempt, RetryCounter};
use harvest_queue::{QueueError, Task, TaskHandler, TaskSink};
use harvest_session::SessionScheduler;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Requeue listing-page and list endpoint tasks untouched
    pub ignore_list: bool,
    /// Requeue list and content endpoint tasks untouched
    pub ignore_api: bool,
    /// Attempts per task before it is dropped
    pub max_retries: u32,
    /// Content page used when the content endpoint fails, id is appended
    pub content_page_url: String,
}

impl DispatcherOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ignore_list: config.crawl.ignore_list_task,
            ignore_api: config.crawl.ignore_api_task,
            max_retries: config.crawl.max_task_retries,
            content_page_url: config.site.content_page_url.clone(),
        }
    }
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The queue's [`TaskHandler`].
pub struct Dispatcher {
    session: Arc<SessionScheduler>,
    list: ListApiHandler,
    doc: DocApiHandler,
    pages: Arc<dyn PageCrawler>,
    sink: Arc<dyn TaskSink>,
    retries: RetryCounter,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(
        session: Arc<SessionScheduler>,
        list: ListApiHandler,
        doc: DocApiHandler,
        sink: Arc<dyn TaskSink>,
        options: DispatcherOptions,
    ) -> Self {
        Self {
            session,
            list,
            doc,
            pages: Arc::new(LoggingPageCrawler),
            sink,
            // never expires: only success or exhaustion clears a key
            retries: RetryCounter::with_limits(DEFAULT_CAPACITY, None, options.max_retries),
            options,
        }
    }

    #[must_use]
    pub fn with_page_crawler(mut self, pages: Arc<dyn PageCrawler>) -> Self {
        self.pages = pages;
        self
    }

    fn is_ignored(&self, task: &Task) -> bool {
        match task {
            Task::ListPage(_) => self.options.ignore_list,
            Task::ListApi(_) => self.options.ignore_list || self.options.ignore_api,
            Task::DocApi(_) => self.options.ignore_api,
            Task::DocPage(_) | Task::NormalSearch(_) => false,
        }
    }

    async fn settle(&self, task: Task, outcome: Result<HandlerOutcome>) -> harvest_queue::Result<()> {
        match outcome {
            Ok(HandlerOutcome::Done) => self.retries.reset(&task.value()),
            Ok(HandlerOutcome::Retry) => self.retry(task),
            Ok(HandlerOutcome::RetryAfterRefresh(reason)) => {
                self.refresh(&reason).await?;
                self.retry(task);
            }
            Ok(HandlerOutcome::Fallback { refresh }) => {
                if let Some(reason) = refresh {
                    self.refresh(&reason).await?;
                }
                self.retries.reset(&task.value());
                self.fall_back(task);
            }
            Err(e) if e.is_fatal() => {
                error!(tag = %task.tag(), "fatal error, stop processing: {}", e);
                return Err(QueueError::Fatal(e.to_string()));
            }
            Err(e) => {
                warn!(tag = %task.tag(), "process task failed: {}", e);
                self.retry(task);
            }
        }
        Ok(())
    }

    fn retry(&self, task: Task) {
        let key = task.value();
        match self.retries.increment_and_check(&key) {
            Attempt::Allowed(attempt) => {
                info!(tag = %task.tag(), attempt, "process task failed. add task again. {}", key);
                self.sink.push(task);
            }
            Attempt::Exceeded => {
                warn!(tag = %task.tag(), "task retried too many times, dropped. {}", key);
                self.retries.reset(&key);
            }
        }
    }

    fn fall_back(&self, task: Task) {
        match task {
            Task::DocApi(id) => {
                let url = format!("{}{}&KeyWord=", self.options.content_page_url, id);
                info!(doc_id = %id, "add content page task instead");
                self.sink.push(Task::DocPage(url));
            }
            other => warn!(tag = %other.tag(), "no fallback for task, dropped"),
        }
    }

    async fn refresh(&self, reason: &str) -> harvest_queue::Result<()> {
        match self.session.refresh(reason).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(QueueError::Fatal(e.to_string())),
            Err(e) => {
                warn!(reason, "session refresh failed: {}", e);
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl TaskHandler for Dispatcher {
    async fn handle(&self, task: Task) -> harvest_queue::Result<()> {
        if self.is_ignored(&task) {
            debug!(tag = %task.tag(), "task family ignored, add task again");
            self.sink.push(task);
            return Ok(());
        }

        let outcome = match &task {
            Task::ListApi(list) => self.list.handle(list).await,
            Task::DocApi(id) => self.doc.handle(id).await,
            Task::ListPage(url) => self.pages.list_page(url).await,
            Task::DocPage(url) => self.pages.doc_page(url).await,
            Task::NormalSearch(keyword) => self.pages.normal_search(keyword).await,
        };
        self.settle(task, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ListApiClient;
    use crate::doc_api::DocFetchOptions;
    use crate::testing::{harness, Harness, ScriptedBrowser, ScriptedEvaluator};
    use harvest_core::{encode_value, SiteConfig};
    use harvest_decoder::Classifier;
    use harvest_queue::ListApiTask;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC: &str = "a34b1ced-9c80-4509-b353-0588bbb88b5e";

    async fn setup(body: &str, status: u16, options: DispatcherOptions) -> (MockServer, Harness, Dispatcher) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;

        let h = harness(ScriptedBrowser::default(), ScriptedEvaluator::default()).await;
        let classifier = Arc::new(Classifier::default());
        let site = SiteConfig {
            base_url: server.uri(),
            ..SiteConfig::default()
        };
        let list = ListApiHandler::new(
            h.session.clone(),
            ListApiClient::new(&site, None, Duration::from_secs(5)).expect("client"),
            classifier.clone(),
            h.store.clone(),
            h.sink.clone(),
        );
        let doc = DocApiHandler::new(
            h.session.clone(),
            classifier,
            h.store.clone(),
            DocFetchOptions {
                polls: 2,
                poll_interval: Duration::from_millis(1),
                ..DocFetchOptions::default()
            },
        );
        let dispatcher = Dispatcher::new(h.session.clone(), list, doc, h.sink.clone(), options);
        (server, h, dispatcher)
    }

    fn list_task() -> Task {
        Task::ListApi(ListApiTask::new(encode_value("案件类型:刑事案件"), 1))
    }

    #[tokio::test]
    async fn test_failed_task_is_requeued_until_bound() {
        let options = DispatcherOptions {
            max_retries: 2,
            ..DispatcherOptions::default()
        };
        let (_server, h, dispatcher) = setup("", 503, options).await;

        for _ in 0..3 {
            dispatcher.handle(list_task()).await.expect("handle");
        }
        // two requeues, then dropped
        assert_eq!(h.sink.tasks(), vec![list_task(), list_task()]);

        // the counter was cleared on drop
        dispatcher.handle(list_task()).await.expect("handle");
        assert_eq!(h.sink.tasks().len(), 3);
    }

    #[tokio::test]
    async fn test_stale_session_refreshes_then_requeues() {
        let (_server, h, dispatcher) = setup("\"remind\"", 200, DispatcherOptions::default()).await;
        let before = h.session.credentials().await.unwrap().generation;

        dispatcher.handle(list_task()).await.expect("handle");

        assert_eq!(h.session.credentials().await.unwrap().generation, before + 1);
        assert_eq!(h.sink.tasks(), vec![list_task()]);
    }

    #[tokio::test]
    async fn test_failed_doc_becomes_content_page_task() {
        let (_server, h, dispatcher) = setup("[]", 200, DispatcherOptions::default()).await;

        dispatcher
            .handle(Task::DocApi(DOC.to_string()))
            .await
            .expect("handle");

        assert_eq!(
            h.sink.tasks(),
            vec![Task::DocPage(format!(
                "http://wenshu.court.gov.cn/content/content?DocID={DOC}&KeyWord="
            ))]
        );
    }

    #[tokio::test]
    async fn test_ignored_families_are_requeued_untouched() {
        let options = DispatcherOptions {
            ignore_api: true,
            ..DispatcherOptions::default()
        };
        let (server, h, dispatcher) = setup("[]", 200, options).await;

        dispatcher.handle(list_task()).await.expect("handle");
        dispatcher
            .handle(Task::DocApi(DOC.to_string()))
            .await
            .expect("handle");
        dispatcher
            .handle(Task::NormalSearch("盗窃".to_string()))
            .await
            .expect("handle");

        assert_eq!(
            h.sink.tasks(),
            vec![list_task(), Task::DocApi(DOC.to_string())]
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    struct CountingCrawler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl PageCrawler for CountingCrawler {
        async fn list_page(&self, url: &str) -> Result<HandlerOutcome> {
            self.seen.lock().unwrap().push(url.to_string());
            Ok(HandlerOutcome::Retry)
        }
        async fn doc_page(&self, url: &str) -> Result<HandlerOutcome> {
            self.seen.lock().unwrap().push(url.to_string());
            Ok(HandlerOutcome::Done)
        }
        async fn normal_search(&self, keyword: &str) -> Result<HandlerOutcome> {
            self.seen.lock().unwrap().push(keyword.to_string());
            Ok(HandlerOutcome::Done)
        }
    }

    #[tokio::test]
    async fn test_page_tasks_reach_page_crawler() {
        let (_server, h, dispatcher) = setup("[]", 200, DispatcherOptions::default()).await;
        let crawler = Arc::new(CountingCrawler {
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = dispatcher.with_page_crawler(crawler.clone());

        let list_page = Task::ListPage("http://wenshu.court.gov.cn/List/List?sorttype=1".to_string());
        dispatcher.handle(list_page.clone()).await.expect("handle");
        dispatcher
            .handle(Task::DocPage("http://wenshu.court.gov.cn/content/content?DocID=x".to_string()))
            .await
            .expect("handle");

        assert_eq!(crawler.seen.lock().unwrap().len(), 2);
        assert_eq!(h.sink.tasks(), vec![list_page]);
    }
}
