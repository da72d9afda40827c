//! Marker rule sets.
//!
//! The target site changes its anti-automation markup without notice, so
//! every string the classifier matches on lives here and can be replaced by
//! a TOML file without a rebuild.

use crate::error::{DecodeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Newest rule set layout this build understands.
pub const RULES_VERSION: u32 = 1;

const VERIFY_REDIRECT: &str = "window.location.href='/Html_Pages/VisitRemind20180914.html";

/// Markers used to classify list responses and content pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Layout version of this rule set
    pub version: u32,

    /// Free-form label, logged on load
    pub name: String,

    /// Prefixes marking a body as an HTML document rather than a payload
    pub html_prefixes: Vec<String>,

    /// Body fragments of the verification interstitial
    pub challenge_markers: Vec<String>,

    /// Title fragments of the verification interstitial
    pub challenge_title_markers: Vec<String>,

    /// Body fragments of pages that need a reload of the session page
    pub refresh_markers: Vec<String>,

    /// Whole bodies (case-insensitive) meaning the token is stale
    pub stale_sentinels: Vec<String>,

    /// Whole bodies meaning the query has nothing to return
    pub empty_bodies: Vec<String>,

    /// Fragment present on every valid content page
    pub content_marker: String,

    /// Fragment of a content page redirecting to the verification page
    pub verify_redirect_marker: String,

    /// Fragment of the proxy provider's "too many requests" page
    pub proxy_throttle_marker: String,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            version: RULES_VERSION,
            name: "builtin".to_string(),
            html_prefixes: vec!["<html>".to_string(), "<!DOCTYPE html>".to_string()],
            challenge_markers: vec!["访问验证".to_string(), VERIFY_REDIRECT.to_string()],
            challenge_title_markers: vec!["访问验证".to_string()],
            refresh_markers: vec!["请开启JavaScript并刷新该页".to_string()],
            stale_sentinels: vec!["\"remind\"".to_string(), "\"remind key\"".to_string()],
            empty_bodies: vec!["[]".to_string(), "\"\"".to_string(), "null".to_string()],
            content_marker: "$(function(){$(\"#con_llcs\").html".to_string(),
            verify_redirect_marker: VERIFY_REDIRECT.to_string(),
            proxy_throttle_marker: "https://www.abuyun.com/".to_string(),
        }
    }
}

impl RuleSet {
    /// Parse a rule set from TOML. Omitted keys keep their built-in values.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let rules: Self =
            toml::from_str(contents).map_err(|e| DecodeError::InvalidRules(e.to_string()))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Load a rule set file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let rules = Self::from_toml_str(&contents)?;
        info!(
            name = %rules.name,
            version = rules.version,
            "Loaded classification rules from {}",
            path.display()
        );
        Ok(rules)
    }

    /// Reject rule sets this build cannot apply.
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 || self.version > RULES_VERSION {
            return Err(DecodeError::InvalidRules(format!(
                "unsupported version {}, expected 1..={RULES_VERSION}",
                self.version
            )));
        }

        if self.html_prefixes.iter().any(String::is_empty) {
            return Err(DecodeError::InvalidRules(
                "html prefixes cannot be empty".to_string(),
            ));
        }

        if self.content_marker.is_empty() {
            return Err(DecodeError::InvalidRules(
                "content marker cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
