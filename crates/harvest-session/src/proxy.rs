//! Proxy provider status parsing and exit IP reuse tracking.

use crate::error::{Result, SessionError};
use harvest_core::RetryCounter;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Window in which a reappearing exit IP is reported.
pub const IP_REUSE_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Reappearances tolerated inside the window before warning.
pub const IP_REUSE_LIMIT: u32 = 2;

/// Parsed answer of the proxy switch endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyStatus {
    pub ip: String,
    /// Status text with markup removed
    pub raw: String,
}

/// Parse the switch endpoint's page: markup stripped, then at least three
/// comma separated fields, the first being the new IP.
pub fn parse_switch_status(page: &str) -> Result<ProxyStatus> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"</?.+?/?>").expect("valid regex"));

    let raw = tag.replace_all(page, "").trim().to_string();
    let items: Vec<&str> = raw.split(',').map(str::trim).collect();
    if items.len() < 3 || items[0].is_empty() {
        return Err(SessionError::ProxyStatus(raw));
    }

    Ok(ProxyStatus {
        ip: items[0].to_string(),
        raw,
    })
}

/// Counts how often each exit IP is handed out within a sliding window.
///
/// Only reports; the provider decides when a new IP is actually granted.
#[derive(Debug)]
pub struct IpMonitor {
    counter: RetryCounter,
}

impl Default for IpMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl IpMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: RetryCounter::with_limits(100_000, Some(IP_REUSE_WINDOW), u32::MAX),
        }
    }

    /// Record one grant of `ip`; returns its count in the window.
    pub fn observe(&self, ip: &str) -> u32 {
        self.counter.increment_and_check(ip);
        let count = self.counter.count(ip);
        if count > IP_REUSE_LIMIT {
            tracing::warn!(ip, count, "proxy ip returned {} times in 30 minutes", count);
        }
        count
    }
}
