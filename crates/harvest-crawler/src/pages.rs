//! DOM-scraping collaborators for the page-level task tags.

use crate::error::Result;
use crate::outcome::HandlerOutcome;
use tracing::info;

/// Crawls listing pages, content pages and full-text searches through the
/// site's own UI.
#[async_trait::async_trait]
pub trait PageCrawler: Send + Sync {
    /// Crawl one listing page URL.
    async fn list_page(&self, url: &str) -> Result<HandlerOutcome>;

    /// Crawl one content page URL.
    async fn doc_page(&self, url: &str) -> Result<HandlerOutcome>;

    /// Run one full-text search.
    async fn normal_search(&self, keyword: &str) -> Result<HandlerOutcome>;
}

/// Acknowledges page tasks without crawling them.
#[derive(Debug, Default)]
pub struct LoggingPageCrawler;

#[async_trait::async_trait]
impl PageCrawler for LoggingPageCrawler {
    async fn list_page(&self, url: &str) -> Result<HandlerOutcome> {
        info!(url, "list page task acknowledged");
        Ok(HandlerOutcome::Done)
    }

    async fn doc_page(&self, url: &str) -> Result<HandlerOutcome> {
        info!(url, "doc page task acknowledged");
        Ok(HandlerOutcome::Done)
    }

    async fn normal_search(&self, keyword: &str) -> Result<HandlerOutcome> {
        info!(keyword, "normal search task acknowledged");
        Ok(HandlerOutcome::Done)
    }
}
