//! Harvest Crawler
//!
//! Task handlers and the process wiring of the harvester:
//!
//! - [`client`] - HTTP client for the list endpoint
//! - [`list_api`] - list tasks: fetch, decrypt, paginate and subdivide
//! - [`doc_api`] - content tasks fetched through the shared browser
//! - [`pages`] - page-level tasks crawled through the site UI
//! - [`dispatcher`] - routes queue tasks and applies retry and fallback
//! - [`reprocess`] - second pass over parked list payloads

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod client;
pub mod dispatcher;
pub mod doc_api;
pub mod error;
pub mod list_api;
pub mod outcome;
pub mod pages;
pub mod reprocess;

#[cfg(test)]
mod testing;

pub use client::{ListApiClient, ListResponse};
pub use dispatcher::{Dispatcher, DispatcherOptions};
pub use doc_api::{DocApiHandler, DocFetchOptions};
pub use error::{CrawlerError, Result};
pub use list_api::{ingest, ListApiHandler};
pub use outcome::HandlerOutcome;
pub use pages::{LoggingPageCrawler, PageCrawler};
pub use reprocess::{ReprocessOptions, Reprocessor, SELF_TEST_PAYLOAD};
