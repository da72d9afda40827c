//! Direct HTTP access to the list endpoint.

use crate::error::Result;
use harvest_browser::USER_AGENT;
use harvest_core::{encode_value, SiteConfig};
use harvest_queue::ListApiTask;
use harvest_session::Credentials;
use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, ORIGIN};
use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::debug;

/// Records per page requested from the endpoint.
pub const PAGE_SIZE: &str = "10";

/// Facet used as the secondary sort key.
const ORDER_FACET: &str = "法院层级";

/// Status and body of one list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    pub status: u16,
    pub body: String,
}

impl ListResponse {
    /// `<title>` of an HTML answer, empty for payloads.
    #[must_use]
    pub fn title(&self) -> &str {
        page_title(&self.body)
    }
}

/// Pooled client for the list endpoint.
#[derive(Debug, Clone)]
pub struct ListApiClient {
    client: Client,
    url: String,
    origin: String,
}

impl ListApiClient {
    /// Build a client for `site`, routed through `proxy` (`host:port`) when set.
    pub fn new(site: &SiteConfig, proxy: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .deflate(true);
        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(format!("http://{proxy}"))?);
        }

        Ok(Self {
            client: builder.build()?,
            url: site.list_url(),
            origin: site.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Form body for one page. `Param`, GUID and token are already encoded.
    #[must_use]
    pub fn form_body(task: &ListApiTask, credentials: &Credentials) -> String {
        format!(
            "Param={}&Index={}&Page={}&Order={}&Direction=asc&number=wens&guid={}&vl5x={}",
            task.param,
            task.index,
            PAGE_SIZE,
            encode_value(ORDER_FACET),
            credentials.guid,
            credentials.token
        )
    }

    /// POST one list request. Non-success statuses are returned, not raised.
    pub async fn fetch(&self, task: &ListApiTask, credentials: &Credentials) -> Result<ListResponse> {
        let body = Self::form_body(task, credentials);
        debug!(index = %task.index, "form body is {}", body);

        let response = self
            .client
            .post(&self.url)
            .header(COOKIE, &credentials.cookie)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT_LANGUAGE, harvest_browser::ACCEPT_LANGUAGE)
            .header(ORIGIN, &self.origin)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=UTF-8")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(status, "list response code");
        let body = response.text().await?;
        Ok(ListResponse { status, body })
    }
}

/// Text between the first `<title>` and `</title>`.
#[must_use]
pub fn page_title(body: &str) -> &str {
    let Some(start) = body.find("<title>") else {
        return "";
    };
    let rest = &body[start + "<title>".len()..];
    rest.find("</title>").map_or("", |end| rest[..end].trim())
}
