use crate::error::{Result, SessionError};
use crate::proxy::{parse_switch_status, IpMonitor, ProxyStatus};
use crate::state::{Credentials, SessionState};
use harvest_browser::{cookie_header, BrowserDriver, RateLimiter, ScriptEvaluator};
use harvest_core::{encode_value, AppConfig, Timestamp};
use harvest_db::{RotationRecord, Store};
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

/// Tunables of the session scheduler.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Listing page that exposes the full cookie set
    pub bootstrap_url: String,
    /// Proxy provider endpoint that switches the exit IP
    pub proxy_switch_url: String,
    /// Rotate the exit IP before every refresh
    pub switch_ip: bool,
    /// Proxy endpoint handed to direct HTTP calls
    pub proxy: Option<String>,
    /// Refresh attempts before giving up
    pub max_attempts: u32,
    /// Minimum age of the exit IP before the periodic check rotates it
    pub rotation_interval: Duration,
}

impl SessionOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bootstrap_url: config.site.bootstrap_url.clone(),
            proxy_switch_url: config.site.proxy_switch_url.clone(),
            switch_ip: config.browser.switch_ip,
            proxy: config.browser.active_proxy().map(str::to_string),
            max_attempts: 50,
            rotation_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Exclusive use of the browser session, with one unit of rate budget spent.
pub struct BrowserGuard<'a> {
    _gate: MutexGuard<'a, ()>,
    driver: &'a Arc<dyn BrowserDriver>,
}

impl Deref for BrowserGuard<'_> {
    type Target = dyn BrowserDriver;

    fn deref(&self) -> &Self::Target {
        &**self.driver
    }
}

/// Owns the browser session and the credentials minted from it.
pub struct SessionScheduler {
    driver: Arc<dyn BrowserDriver>,
    evaluator: Arc<dyn ScriptEvaluator>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn Store>,
    options: SessionOptions,
    state: RwLock<SessionState>,
    // serializes every use of the browser
    gate: Mutex<()>,
    ip_monitor: IpMonitor,
    cancel: CancellationToken,
    process: String,
}

impl SessionScheduler {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        evaluator: Arc<dyn ScriptEvaluator>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn Store>,
        options: SessionOptions,
    ) -> Self {
        Self {
            driver,
            evaluator,
            limiter,
            store,
            options,
            state: RwLock::new(SessionState::default()),
            gate: Mutex::new(()),
            ip_monitor: IpMonitor::new(),
            cancel: CancellationToken::new(),
            process: process_identity(),
        }
    }

    /// Stop refresh loops when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Open the bootstrap page and mint the first credentials.
    pub async fn initialize(&self) -> Result<()> {
        {
            let _gate = self.gate.lock().await;
            self.limiter.acquire().await;
            self.driver.navigate(&self.options.bootstrap_url).await?;
        }
        self.refresh("system initialize").await
    }

    /// Mint fresh cookies, GUID and token, rotating the exit IP first when
    /// enabled. Readers of [`credentials`](Self::credentials) wait until this
    /// returns.
    ///
    /// # Errors
    /// [`SessionError::Fatal`] when the browser session is destroyed,
    /// [`SessionError::RefreshFailed`] when every attempt failed.
    pub async fn refresh(&self, reason: &str) -> Result<()> {
        tracing::info!(reason, "refreshing session");
        let mut state = self.state.write().await;
        let _gate = self.gate.lock().await;

        if self.options.switch_ip {
            match self.rotate_ip(&mut state, reason).await {
                Ok(status) => tracing::info!(ip = %status.ip, "exit ip switched"),
                Err(e) if e.is_fatal() => return Err(SessionError::Fatal(e.to_string())),
                Err(e) => tracing::warn!("switch ip failed: {}", e),
            }
        }

        let mut last_error = String::new();
        for attempt in 1..=self.options.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            match self.try_refresh(&mut state).await {
                Ok(()) => {
                    tracing::info!(
                        attempt,
                        generation = state.generation,
                        guid = state.guid.as_deref().unwrap_or_default(),
                        "session refreshed"
                    );
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("browser session lost during refresh: {}", e);
                    return Err(SessionError::Fatal(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!(attempt, "refresh attempt failed: {}", e);
                    last_error = e.to_string();
                }
            }
        }

        Err(SessionError::RefreshFailed {
            attempts: self.options.max_attempts,
            last_error,
        })
    }

    /// Rotate the exit IP when rotation is on and the current one is older
    /// than the rotation interval. Returns whether a refresh ran.
    pub async fn periodic_check(&self) -> Result<bool> {
        if !self.options.switch_ip {
            return Ok(false);
        }

        let due = {
            let state = self.state.read().await;
            state
                .last_rotation
                .map_or(true, |at| at.elapsed() > self.options.rotation_interval)
        };
        if !due {
            return Ok(false);
        }

        self.refresh("period refresh ip").await.map(|()| true)
    }

    /// Spend one unit of request budget and snapshot the credentials.
    pub async fn acquire(&self) -> Option<Credentials> {
        self.limiter.acquire().await;
        self.credentials().await
    }

    /// Current credentials, waiting for an in-progress refresh.
    pub async fn credentials(&self) -> Option<Credentials> {
        self.state.read().await.credentials()
    }

    /// Exclusive browser access for one navigation-sized unit of work.
    pub async fn acquire_browser(&self) -> BrowserGuard<'_> {
        let gate = self.gate.lock().await;
        self.limiter.acquire().await;
        BrowserGuard {
            _gate: gate,
            driver: &self.driver,
        }
    }

    /// Script evaluator bound to the session's browser.
    #[must_use]
    pub fn evaluator(&self) -> Arc<dyn ScriptEvaluator> {
        Arc::clone(&self.evaluator)
    }

    /// True when traffic leaves through a proxy.
    #[must_use]
    pub fn is_proxied(&self) -> bool {
        self.options.proxy.is_some()
    }

    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    async fn try_refresh(&self, state: &mut SessionState) -> Result<()> {
        self.driver.delete_all_cookies().await?;

        let current = self.driver.current_window().await?;
        let main = state
            .main_window
            .get_or_insert_with(|| current.clone())
            .clone();

        self.limiter.acquire().await;
        if current != main {
            self.driver.switch_to(&main).await?;
        }
        let previous_url = self.driver.current_url().await?;

        let minted = self.mint(&previous_url).await;

        if current != main {
            if let Err(e) = self.driver.switch_to(&current).await {
                tracing::warn!("switch back to {} failed: {}", current, e);
            }
        }

        let (cookie, guid, token) = minted?;
        state.cookie = cookie;
        state.guid = Some(encode_value(&guid));
        state.token = Some(encode_value(&token));
        state.proxy.clone_from(&self.options.proxy);
        state.generation += 1;
        Ok(())
    }

    /// Harvest cookies from the bootstrap page, then derive GUID and token.
    async fn mint(&self, previous_url: &str) -> Result<(String, String, String)> {
        tracing::info!("start load bootstrap page for cookie");
        self.driver.navigate(&self.options.bootstrap_url).await?;
        let cookies = self.driver.cookies().await?;
        for cookie in &cookies {
            tracing::debug!("{} -> {}", cookie.name, cookie.value);
        }
        let cookie = cookie_header(&cookies);

        if is_restorable(previous_url) && previous_url != self.options.bootstrap_url {
            self.limiter.acquire().await;
            self.driver.navigate(previous_url).await?;
        }

        let guid = self.build_guid().await?;
        let token = self.evaluator.derive_token().await?;
        Ok((cookie, guid, token))
    }

    async fn build_guid(&self) -> Result<String> {
        let mut fragments = Vec::with_capacity(8);
        for _ in 0..8 {
            fragments.push(self.evaluator.guid_fragment().await?);
        }
        Ok(guid_from_fragments(&fragments))
    }

    async fn rotate_ip(&self, state: &mut SessionState, reason: &str) -> Result<ProxyStatus> {
        let previous_url = self.driver.current_url().await?;
        tracing::info!(url = %previous_url, "switch ip");

        self.limiter.acquire().await;
        self.driver.navigate(&self.options.proxy_switch_url).await?;
        let page = self.driver.page_source().await?;
        let parsed = parse_switch_status(&page);

        if is_restorable(&previous_url) {
            self.limiter.acquire().await;
            self.driver.navigate(&previous_url).await?;
        }

        let status = parsed?;
        let previous_ip = state.last_ip.replace(status.ip.clone());
        state.last_rotation = Some(Instant::now());

        let record = RotationRecord {
            new_ip: status.ip.clone(),
            previous_ip,
            raw_status: status.raw.clone(),
            reason: reason.to_string(),
            process: self.process.clone(),
            recorded_at: Timestamp::now().to_rfc3339(),
        };
        if let Err(e) = self.store.append_rotation(&record).await {
            tracing::warn!("failed to record ip rotation: {}", e);
        }

        self.ip_monitor.observe(&status.ip);
        Ok(status)
    }
}

/// Join eight fragments as `ff-f-ff-fff`.
fn guid_from_fragments(f: &[String]) -> String {
    format!(
        "{}{}-{}-{}{}-{}{}{}",
        f[0], f[1], f[2], f[3], f[4], f[5], f[6], f[7]
    )
}

fn is_restorable(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn process_identity() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{}@{}", std::process::id(), host)
}
