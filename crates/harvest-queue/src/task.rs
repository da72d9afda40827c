//! Task values and their wire envelope.

use crate::error::{QueueError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Wire tag of a task family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    List,
    NormalSearch,
    Doc,
    ApiList,
    ApiDoc,
}

impl Tag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "TagList",
            Self::NormalSearch => "TagNormalSearch",
            Self::Doc => "TagDoc",
            Self::ApiList => "TagApiList",
            Self::ApiDoc => "TagApiDoc",
        }
    }

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "TagList" => Ok(Self::List),
            "TagNormalSearch" => Ok(Self::NormalSearch),
            "TagDoc" => Ok(Self::Doc),
            "TagApiList" => Ok(Self::ApiList),
            "TagApiDoc" => Ok(Self::ApiDoc),
            other => Err(QueueError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of one list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListApiTask {
    /// Percent-encoded `facet:value` list
    #[serde(rename = "Param")]
    pub param: String,
    /// 1-based page number
    #[serde(rename = "Index")]
    pub index: String,
}

impl ListApiTask {
    pub fn new(param: impl Into<String>, index: u32) -> Self {
        Self {
            param: param.into(),
            index: index.to_string(),
        }
    }

    /// Parse a task value. Older producers wrote single-quoted pseudo-JSON
    /// and numeric indexes; both are accepted.
    pub fn parse(value: &str) -> Result<Self> {
        let json: Value = serde_json::from_str(value)
            .or_else(|_| serde_json::from_str(&value.replace('\'', "\"")))
            .map_err(|e| QueueError::Decode(format!("list task {value}: {e}")))?;

        let param = json
            .get("Param")
            .and_then(Value::as_str)
            .ok_or_else(|| QueueError::Decode(format!("list task without Param: {value}")))?;
        let index = match json.get("Index") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(QueueError::Decode(format!("list task without Index: {value}"))),
        };

        Ok(Self {
            param: param.to_string(),
            index,
        })
    }

    /// True on the first page, the only one that schedules follow-ups.
    #[must_use]
    pub fn is_first_page(&self) -> bool {
        self.index == "1"
    }
}

/// A unit of work carried by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// List endpoint call
    ListApi(ListApiTask),
    /// Content endpoint fetch for a document identifier
    DocApi(String),
    /// Listing page crawled through the DOM
    ListPage(String),
    /// Content page crawled through the DOM
    DocPage(String),
    /// Full-text search through the site's search box
    NormalSearch(String),
}

/// `{"tag": ..., "value": ...}` as stored in the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub tag: String,
    pub value: String,
}

impl Task {
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Self::ListApi(_) => Tag::ApiList,
            Self::DocApi(_) => Tag::ApiDoc,
            Self::ListPage(_) => Tag::List,
            Self::DocPage(_) => Tag::Doc,
            Self::NormalSearch(_) => Tag::NormalSearch,
        }
    }

    /// Envelope value; also the task's identity for retry counting.
    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Self::ListApi(task) => {
                serde_json::to_string(task).unwrap_or_else(|_| format!("{task:?}"))
            }
            Self::DocApi(v) | Self::ListPage(v) | Self::DocPage(v) | Self::NormalSearch(v) => {
                v.clone()
            }
        }
    }

    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            tag: self.tag().as_str().to_string(),
            value: self.value(),
        }
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let value = envelope.value.clone();
        Ok(match Tag::parse(&envelope.tag)? {
            Tag::ApiList => Self::ListApi(ListApiTask::parse(&value)?),
            Tag::ApiDoc => Self::DocApi(value),
            Tag::List => Self::ListPage(value),
            Tag::Doc => Self::DocPage(value),
            Tag::NormalSearch => Self::NormalSearch(value),
        })
    }

    /// Encode for the broker.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(&self.to_envelope()).map_err(|e| QueueError::Decode(e.to_string()))
    }

    /// Decode a broker message.
    pub fn decode(message: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(message)
            .map_err(|e| QueueError::Decode(format!("{message}: {e}")))?;
        Self::from_envelope(&envelope)
    }
}
