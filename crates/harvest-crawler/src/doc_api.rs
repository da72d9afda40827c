//! Content endpoint tasks.
//!
//! The content endpoint only answers inside the session's browser, so a
//! fetch holds the browser for its whole run and always returns it to the
//! bootstrap page.

use crate::error::Result;
use crate::outcome::HandlerOutcome;
use harvest_browser::{BrowserDriver, BrowserError};
use harvest_core::{AppConfig, DocId};
use harvest_db::{DocumentContent, Store};
use harvest_decoder::{extract_content, Classifier, DocContent, PageClass};
use harvest_session::SessionScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunables of the content fetch.
#[derive(Debug, Clone)]
pub struct DocFetchOptions {
    /// Content endpoint, document id is appended
    pub content_url: String,
    /// Verification page, document id is appended
    pub verify_url: String,
    /// Page the browser returns to after each fetch
    pub bootstrap_url: String,
    /// Visible browser on a direct connection: challenges wait for a person
    pub interactive: bool,
    /// Page source checks before giving up
    pub polls: u32,
    pub poll_interval: Duration,
    /// Checks for the person to leave the verification page
    pub verify_polls: u32,
    pub verify_interval: Duration,
}

impl DocFetchOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            content_url: config.site.content_url.clone(),
            verify_url: config.site.verify_url.clone(),
            bootstrap_url: config.site.bootstrap_url.clone(),
            interactive: !config.browser.headless && config.browser.active_proxy().is_none(),
            polls: 60,
            poll_interval: Duration::from_millis(500),
            verify_polls: 60,
            verify_interval: Duration::from_secs(1),
        }
    }
}

impl Default for DocFetchOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug)]
enum Fetched {
    Content(DocContent),
    Failed { refresh: Option<&'static str> },
}

impl Fetched {
    fn failed() -> Self {
        Self::Failed { refresh: None }
    }
}

pub struct DocApiHandler {
    session: Arc<SessionScheduler>,
    classifier: Arc<Classifier>,
    store: Arc<dyn Store>,
    options: DocFetchOptions,
    cancel: CancellationToken,
}

impl DocApiHandler {
    pub fn new(
        session: Arc<SessionScheduler>,
        classifier: Arc<Classifier>,
        store: Arc<dyn Store>,
        options: DocFetchOptions,
    ) -> Self {
        Self {
            session,
            classifier,
            store,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon page waits when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fetch and store the content of one document.
    ///
    /// Invalid and already fetched identifiers are done without a fetch. A
    /// failed fetch asks for the page crawler fallback.
    pub async fn handle(&self, id: &str) -> Result<HandlerOutcome> {
        let Ok(doc_id) = DocId::new(id) else {
            warn!(doc_id = id, "invalid docId");
            return Ok(HandlerOutcome::Done);
        };
        if self.store.is_content_fetched(&doc_id).await? {
            info!(doc_id = %doc_id, "doc already got");
            return Ok(HandlerOutcome::Done);
        }

        let fetched = {
            let browser = self.session.acquire_browser().await;
            let fetched = self.fetch(&*browser, &doc_id).await;
            if let Err(e) = browser.navigate(&self.options.bootstrap_url).await {
                if e.is_session_lost() {
                    return Err(e.into());
                }
                warn!("navigate back to bootstrap page failed: {}", e);
            }
            fetched
        };

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(e) => {
                warn!(doc_id = %doc_id, "browser error: {}", e);
                Fetched::failed()
            }
        };

        match fetched {
            Fetched::Content(content) => {
                let content = DocumentContent {
                    content: content.content,
                    case_info: content.case_info,
                    case_type_code: content.case_type_code,
                    court_id: content.court_id,
                };
                self.store.update_content(&doc_id, &content).await?;
                info!(doc_id = %doc_id, "doc content saved");
                Ok(HandlerOutcome::Done)
            }
            Fetched::Failed { refresh } => {
                warn!(doc_id = %doc_id, "get doc content failed");
                Ok(HandlerOutcome::Fallback {
                    refresh: refresh.map(str::to_string),
                })
            }
        }
    }

    async fn fetch(
        &self,
        browser: &dyn BrowserDriver,
        doc_id: &DocId,
    ) -> std::result::Result<Fetched, BrowserError> {
        let target = format!("{}{}", self.options.content_url, doc_id);
        browser.navigate(&target).await?;

        for _ in 0..self.options.polls {
            let source = browser.page_source().await?;
            let title = browser.title().await?;

            match self.classifier.classify_page(&title, &source) {
                PageClass::Pending => {
                    debug!(doc_id = %doc_id, "waiting for response...");
                    if !self.pause(self.options.poll_interval).await {
                        return Ok(Fetched::failed());
                    }
                }
                PageClass::Content => {
                    return Ok(match extract_content(&source) {
                        Ok(content) => Fetched::Content(content),
                        Err(e) => {
                            warn!(doc_id = %doc_id, "invalid content page: {}", e);
                            Fetched::failed()
                        }
                    });
                }
                PageClass::ChallengeRequired => {
                    if !self.options.interactive {
                        info!(doc_id = %doc_id, "need visit verify page");
                        return Ok(Fetched::failed());
                    }
                    if !self.await_verification(browser, doc_id).await? {
                        return Ok(Fetched::failed());
                    }
                    browser.navigate(&target).await?;
                }
                PageClass::ProxyThrottled => {
                    info!("proxy visit too frequent, wait a minute");
                    return Ok(Fetched::failed());
                }
                PageClass::SystemError { needs_refresh } => {
                    warn!(doc_id = %doc_id, "invalid result. {}", source);
                    let refresh = needs_refresh.then(|| {
                        self.classifier
                            .refresh_reason(&title, &source)
                            .unwrap_or("doc page javascript error, need refresh")
                    });
                    return Ok(Fetched::Failed { refresh });
                }
            }
        }

        warn!(doc_id = %doc_id, "doc page load timeout");
        Ok(Fetched::failed())
    }

    /// Open the verification page and wait for a person to leave it.
    async fn await_verification(
        &self,
        browser: &dyn BrowserDriver,
        doc_id: &DocId,
    ) -> std::result::Result<bool, BrowserError> {
        browser
            .navigate(&format!("{}{}", self.options.verify_url, doc_id))
            .await?;

        for _ in 0..self.options.verify_polls {
            let url = browser.current_url().await?;
            if !url.starts_with(&self.options.verify_url) {
                info!(doc_id = %doc_id, "verification passed");
                return Ok(true);
            }
            if !self.pause(self.options.verify_interval).await {
                return Ok(false);
            }
        }

        warn!(doc_id = %doc_id, "verification not passed in time");
        Ok(false)
    }

    /// Sleep unless cancelled first. False when cancelled.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}
