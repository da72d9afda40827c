//! Query descriptors and their `Param` wire form.

use crate::error::{QueryError, Result};
use crate::facet::Facet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered set of `facet:value` constraints defining one search.
///
/// Facet names are unique. Methods that add a constraint return a new
/// descriptor and leave the receiver untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pairs: Vec<(String, String)>,
}

impl QueryDescriptor {
    /// Descriptor without constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs, rejecting repeated facet names.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs
            .into_iter()
            .try_fold(Self::new(), |query, (k, v)| query.with_pair(k, v))
    }

    /// Copy of `self` constrained on `facet`.
    pub fn with(self, facet: Facet, value: impl Into<String>) -> Result<Self> {
        self.with_pair(facet.name(), value)
    }

    /// Copy of `self` constrained on a facet given by name.
    pub fn with_pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if self.get(&key).is_some() {
            return Err(QueryError::DuplicateFacet(key));
        }
        self.pairs.push((key, value.into()));
        Ok(self)
    }

    /// Parent plus one constraint, for facets known to be absent.
    pub(crate) fn extended(&self, facet: Facet, value: &str) -> Self {
        let mut pairs = self.pairs.clone();
        pairs.push((facet.name().to_string(), value.to_string()));
        Self { pairs }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, facet: Facet) -> bool {
        self.get(facet.name()).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Constraints in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as comma separated `key:value` pairs.
    ///
    /// Pairs containing a space cannot be expressed and are dropped with an
    /// error log.
    #[must_use]
    pub fn join(&self) -> String {
        self.pairs
            .iter()
            .filter(|(k, v)| {
                if k.contains(' ') || v.contains(' ') {
                    tracing::error!("params key and value can't contain space. {} - {}", k, v);
                    false
                } else {
                    true
                }
            })
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the form produced by [`join`](Self::join).
    pub fn split(param: &str) -> Result<Self> {
        param
            .split(',')
            .filter(|item| !item.is_empty())
            .try_fold(Self::new(), |query, item| {
                let (k, v) = item
                    .split_once(':')
                    .ok_or_else(|| QueryError::MalformedPair(item.to_string()))?;
                query.with_pair(k, v)
            })
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join())
    }
}
