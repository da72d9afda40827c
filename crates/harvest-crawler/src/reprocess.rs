//! Second pass over list payloads that failed to decode.
//!
//! Payloads parked by the list handler are decoded again once the page
//! scripts work, which is checked first with a known empty answer.

use crate::error::Result;
use crate::list_api::ingest;
use harvest_core::RetryCounter;
use harvest_core::{counter::DEFAULT_CAPACITY, Attempt};
use harvest_db::{RawPayload, Store};
use harvest_decoder::{decrypt, Classification, Classifier, DecodeError, ListPage};
use harvest_queue::TaskSink;
use harvest_session::SessionScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A list answer with `Count` "0" and a `RunEval` section.
pub const SELF_TEST_PAYLOAD: &str = r#"[{"RunEval":"w61aXW/CgjAUw70tGB9KWMO2B8KIT8O+woQ9w54QYsOQTR4mS2VPw4bDvz5gw5jCtVAFBy1VTkLCrsKBw57Cj3PDjsKlNzRxwrlPwrfCu2PDgsOTwq98w7XClsOzw7TDsMOxw7rDjsKzw4/DtX7Dg8OXw5l2w4cCL8KgCMOGacOzAhFgw6bDscKGPAPCkcKZbFdMJcO0FgbCukNZGHQPworCocK5wqAOw77CkAPChMOBGsOCQARoAiXCoA50AjlQQgdgw7AiOGjDvDDCjFfCiyQ7HHPDvsKdw6QZX8KEMcOFUXExFsKcw47CpcKbwrhOZ8KffiPCqTBRFDDCr1rDsEnDjVkudMKvVMK3w4vCv38nECsfFx7DpMKVKxRRw7HDkyjCqMK6e3XDgMO1Yg3DnFrDn8KbwpjDpGzDusOnwqJUwoXCui1RC8KCwpbDg8KNw5wCZD9FwqXDm07DmD09w65xwrvDm8O3fwEDwqLChsKGwo4SP17CksKRM8K5w4hOw51nYj8Zwq1kNsKxQcKBHiPDp8KlwptXR8K3ScOhTcKUwpAGwrQtBlPDrAgTIsOaAmvCrMOYwoPDjsKfJyJQF8KbZgvCqggmG2gKDMKyPRNEw43Di3fDu2h1w63Ct8KxwrvDrETCmMKsw7Rxwr4fJVN2w5UNADXCisOmHMOtdUB2Ui/DjXnCuEXCjsKUwrnCpX8qJ8KkASd6wofDhAMewqnCrMOPw7zDsAc=","Count":"0"},]"#;

#[derive(Debug, Clone)]
pub struct ReprocessOptions {
    /// Parked payloads read per batch
    pub batch_size: i64,
    /// Sleep when nothing is parked
    pub idle_sleep: Duration,
    /// Sleep between two payloads
    pub record_pause: Duration,
    /// Sleep between failed self tests
    pub self_test_pause: Duration,
    /// Failed decodes per payload before it is deleted
    pub max_attempts: u32,
    /// Idle time after which a payload's failures are forgotten
    pub attempt_expiry: Duration,
}

impl Default for ReprocessOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_sleep: Duration::from_secs(10),
            record_pause: Duration::from_secs(1),
            self_test_pause: Duration::from_secs(2),
            max_attempts: 2,
            attempt_expiry: Duration::from_secs(30 * 60),
        }
    }
}

pub struct Reprocessor {
    session: Arc<SessionScheduler>,
    classifier: Arc<Classifier>,
    store: Arc<dyn Store>,
    sink: Arc<dyn TaskSink>,
    retries: RetryCounter,
    options: ReprocessOptions,
    cancel: CancellationToken,
}

impl Reprocessor {
    pub fn new(
        session: Arc<SessionScheduler>,
        classifier: Arc<Classifier>,
        store: Arc<dyn Store>,
        sink: Arc<dyn TaskSink>,
        options: ReprocessOptions,
    ) -> Self {
        Self {
            session,
            classifier,
            store,
            sink,
            retries: RetryCounter::with_limits(
                DEFAULT_CAPACITY,
                Some(options.attempt_expiry),
                options.max_attempts,
            ),
            options,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Self test, then drain parked payloads until cancelled.
    pub async fn run(&self) -> Result<()> {
        if !self.self_test().await? {
            return Ok(());
        }

        let mut offset = 0;
        while !self.cancel.is_cancelled() {
            let batch = self
                .store
                .list_raw_payloads(offset, self.options.batch_size)
                .await?;
            if batch.is_empty() {
                offset = 0;
                if !self.pause(self.options.idle_sleep).await {
                    break;
                }
                continue;
            }

            info!(count = batch.len(), offset, "get raw list data");
            for payload in &batch {
                if !self.process(payload).await? {
                    // kept rows stay in front of the next batch
                    offset += 1;
                }
                if !self.pause(self.options.record_pause).await {
                    break;
                }
            }
        }

        info!("reprocessor stopped");
        Ok(())
    }

    /// Decode the known empty answer until the page scripts work, reloading
    /// the bootstrap page between attempts. False when cancelled first.
    pub async fn self_test(&self) -> Result<bool> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            match self.decode(SELF_TEST_PAYLOAD).await {
                Ok(_) => {
                    info!("javascript self test passed");
                    return Ok(true);
                }
                Err(e) if e.is_session_lost() => return Err(e.into()),
                Err(e) => warn!("test execute javascript failed. refresh webdriver: {}", e),
            }

            {
                let browser = self.session.acquire_browser().await;
                browser.navigate(&self.session.options().bootstrap_url).await?;
            }
            if !self.pause(self.options.self_test_pause).await {
                return Ok(false);
            }
        }
    }

    /// Try one parked payload. True when its row was deleted.
    pub async fn process(&self, payload: &RawPayload) -> Result<bool> {
        let key = payload.id.to_string();

        let resolved = if self.is_stale_sentinel(&payload.data) {
            true
        } else {
            match self.decode(&payload.data).await {
                Ok(page) => {
                    ingest(self.store.as_ref(), self.sink.as_ref(), &page).await?;
                    true
                }
                // no count is as good as it gets for an old answer
                Err(DecodeError::Retryable(_)) => true,
                Err(e) if e.is_session_lost() => return Err(e.into()),
                Err(e) => {
                    info!(id = payload.id, "get failed again: {}", e);
                    false
                }
            }
        };

        if resolved {
            info!(id = payload.id, "raw data resolved, delete it");
            self.store.delete_raw_payload(payload.id).await?;
            self.retries.reset(&key);
            return Ok(true);
        }

        match self.retries.increment_and_check(&key) {
            Attempt::Allowed(_) => Ok(false),
            Attempt::Exceeded => {
                warn!(id = payload.id, "task retried too many times, ignore this data");
                self.store.delete_raw_payload(payload.id).await?;
                self.retries.reset(&key);
                Ok(true)
            }
        }
    }

    async fn decode(&self, payload: &str) -> harvest_decoder::Result<ListPage> {
        let _browser = self.session.acquire_browser().await;
        let evaluator = self.session.evaluator();
        decrypt(evaluator.as_ref(), payload).await
    }

    fn is_stale_sentinel(&self, data: &str) -> bool {
        self.classifier.classify(200, data, "") == Classification::StaleSession
    }

    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}
