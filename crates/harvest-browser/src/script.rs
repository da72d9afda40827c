//! Evaluation of the site's obfuscation routines.
//!
//! The target page ships `createGuid`, `getKey`, `unzip` and
//! `com.str.Decrypt`. The harvester never reimplements them; it calls them
//! in a live tab through [`ScriptEvaluator`].

use crate::driver::BrowserDriver;
use crate::error::BrowserError;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Marker of an identifier whose ciphertext does not decode to UTF-8.
const MALFORMED_UTF8: &str = "Malformed UTF-8 data";

#[derive(Debug, Error)]
pub enum ScriptError {
    /// Input decodes to invalid UTF-8; retrying will not help.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// The script threw; the page state is suspect.
    #[error("script fault: {0}")]
    Fault(String),

    /// The script ran but returned something of the wrong shape.
    #[error("unexpected script result: {0}")]
    UnexpectedValue(String),

    /// The browser itself failed.
    #[error(transparent)]
    Driver(BrowserError),
}

impl ScriptError {
    /// True when the browser session is gone.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Driver(e) if e.is_session_lost())
    }
}

impl From<BrowserError> for ScriptError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::ScriptError(msg) if msg.contains(MALFORMED_UTF8) => {
                Self::MalformedEncoding(msg)
            }
            BrowserError::ScriptError(msg) => Self::Fault(msg),
            other => Self::Driver(other),
        }
    }
}

/// The four routines the harvester borrows from the page.
#[async_trait::async_trait]
pub trait ScriptEvaluator: Send + Sync {
    /// One random fragment of a session GUID.
    async fn guid_fragment(&self) -> Result<String, ScriptError>;

    /// The auth token derived from the current cookies.
    async fn derive_token(&self) -> Result<String, ScriptError>;

    /// Evaluate a list payload, running its embedded decompression routine.
    /// Returns the evaluated array.
    async fn decode_payload(&self, payload: &str) -> Result<Value, ScriptError>;

    /// Unzip and decrypt one obfuscated document identifier.
    async fn decode_doc_id(&self, obfuscated: &str) -> Result<String, ScriptError>;
}

/// [`ScriptEvaluator`] backed by the current tab of a browser session.
pub struct BrowserScriptEvaluator {
    driver: Arc<dyn BrowserDriver>,
}

impl BrowserScriptEvaluator {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self { driver }
    }

    async fn call_string(&self, script: &str) -> Result<String, ScriptError> {
        match self.driver.execute_script(script).await? {
            Value::String(s) => Ok(s),
            other => Err(ScriptError::UnexpectedValue(other.to_string())),
        }
    }
}

/// Script evaluating a payload and expanding its `RunEval` section.
pub fn payload_script(payload: &str) -> String {
    format!(
        "datalist = eval(({payload})); \
         if (datalist[0].RunEval != undefined) {{ eval(unzip(datalist[0].RunEval)); }} \
         return datalist;"
    )
}

/// Script decrypting one document identifier.
pub fn doc_id_script(obfuscated: &str) -> String {
    // a JSON string literal is a valid JS string literal
    let literal = Value::String(obfuscated.to_string()).to_string();
    format!("var unzipId = unzip({literal}); return com.str.Decrypt(unzipId);")
}

#[async_trait::async_trait]
impl ScriptEvaluator for BrowserScriptEvaluator {
    async fn guid_fragment(&self) -> Result<String, ScriptError> {
        let fragment = self.call_string("return createGuid();").await?;
        tracing::debug!("createGuid() result: {}", fragment);
        Ok(fragment)
    }

    async fn derive_token(&self) -> Result<String, ScriptError> {
        let token = self.call_string("return getKey();").await?;
        tracing::debug!("getKey() result: {}", token);
        Ok(token)
    }

    async fn decode_payload(&self, payload: &str) -> Result<Value, ScriptError> {
        let value = self.driver.execute_script(&payload_script(payload)).await?;
        if value.is_array() {
            Ok(value)
        } else {
            Err(ScriptError::UnexpectedValue(value.to_string()))
        }
    }

    async fn decode_doc_id(&self, obfuscated: &str) -> Result<String, ScriptError> {
        self.call_string(&doc_id_script(obfuscated)).await
    }
}
