use crate::driver::{check_url, BrowserCookie, BrowserDriver, WindowHandle};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::Page;
use futures::stream::StreamExt;
use harvest_core::BrowserConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Tabs {
    // insertion order is handle order
    pages: Vec<(WindowHandle, Page)>,
    current: Option<WindowHandle>,
}

impl Tabs {
    fn get(&self, handle: &WindowHandle) -> Option<&Page> {
        self.pages.iter().find(|(h, _)| h == handle).map(|(_, p)| p)
    }
}

/// Chrome session driven over the DevTools protocol.
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    alive: Arc<AtomicBool>,
    tabs: Mutex<Tabs>,
    next_tab: AtomicU64,
    navigation_timeout: Duration,
}

impl ChromeSession {
    /// Launch a local Chrome, or attach to `remote_url` when configured.
    pub async fn launch(config: &BrowserConfig, fingerprint: &FingerprintConfig) -> Result<Self> {
        let (browser, mut handler) = if let Some(remote) = &config.remote_url {
            tracing::info!("Connecting to remote browser at {}", remote);
            Browser::connect(remote.clone())
                .await
                .map_err(|e| BrowserError::ChromiumError(e.to_string()))?
        } else {
            let mut builder = ChromeConfig::builder()
                .no_sandbox()
                .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
                .arg("--disable-infobars")
                .arg("--disable-extensions")
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage");
            for arg in fingerprint.chrome_args() {
                builder = builder.arg(arg);
            }
            if !config.headless {
                builder = builder.with_head();
            }
            if let Some(proxy) = config.active_proxy() {
                tracing::info!("Routing browser through proxy {}", proxy);
                builder = builder.arg(format!("--proxy-server={proxy}"));
            }
            let chrome = builder.build().map_err(BrowserError::ChromiumError)?;

            Browser::launch(chrome)
                .await
                .map_err(|e| BrowserError::ChromiumError(e.to_string()))?
        };

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = Arc::clone(&alive);
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {}", e);
                }
            }
            tracing::warn!("browser connection closed");
            handler_alive.store(false, Ordering::SeqCst);
        });

        let session = Self {
            browser,
            handler,
            alive,
            tabs: Mutex::new(Tabs::default()),
            next_tab: AtomicU64::new(1),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs.max(1)),
        };
        session.open_window("about:blank").await?;
        Ok(session)
    }

    /// Close the browser and stop the event handler.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("browser close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrowserError::SessionLost("browser connection closed".to_string()))
        }
    }

    fn map_err(&self, err: impl std::fmt::Display) -> BrowserError {
        let msg = err.to_string();
        if !self.alive.load(Ordering::SeqCst) || is_session_lost(&msg) {
            BrowserError::SessionLost(msg)
        } else {
            BrowserError::ChromiumError(msg)
        }
    }

    async fn current_page(&self) -> Result<Page> {
        self.ensure_alive()?;
        let tabs = self.tabs.lock().await;
        let handle = tabs
            .current
            .as_ref()
            .ok_or_else(|| BrowserError::WindowNotFound("no current window".to_string()))?;
        tabs.get(handle)
            .cloned()
            .ok_or_else(|| BrowserError::WindowNotFound(handle.to_string()))
    }
}

/// Error texts that mean the DevTools session is unusable.
fn is_session_lost(msg: &str) -> bool {
    const MARKERS: [&str; 4] = [
        "invalid session id",
        "receiver is gone",
        "channel closed",
        "connection closed",
    ];
    let lower = msg.to_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

/// Wrap a function body so exceptions come back as data instead of a
/// protocol error, keeping the JS message intact.
fn wrap_script(body: &str) -> String {
    format!(
        "(() => {{ try {{ const __v = (function() {{ {body} }})(); \
         return {{ ok: true, value: __v === undefined ? null : __v }}; }} \
         catch (e) {{ return {{ ok: false, error: String((e && e.message) || e) }}; }} }})()"
    )
}

#[async_trait::async_trait]
impl BrowserDriver for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        check_url(url)?;
        let page = self.current_page().await?;
        tracing::debug!("navigate to {}", url);
        match tokio::time::timeout(self.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => match self.map_err(e) {
                BrowserError::ChromiumError(msg) => Err(BrowserError::NavigationError(msg)),
                other => Err(other),
            },
            Err(_) => Err(BrowserError::Timeout(format!(
                "navigation to {url} exceeded {}s",
                self.navigation_timeout.as_secs()
            ))),
        }
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.current_page().await?;
        let url = page.url().await.map_err(|e| self.map_err(e))?;
        Ok(url.unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String> {
        let page = self.current_page().await?;
        page.content().await.map_err(|e| self.map_err(e))
    }

    async fn title(&self) -> Result<String> {
        let page = self.current_page().await?;
        let title = page.get_title().await.map_err(|e| self.map_err(e))?;
        Ok(title.unwrap_or_default())
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        let page = self.current_page().await?;
        let cookies = page.get_cookies().await.map_err(|e| self.map_err(e))?;
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
            })
            .collect())
    }

    async fn delete_all_cookies(&self) -> Result<()> {
        let page = self.current_page().await?;
        page.execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value> {
        let page = self.current_page().await?;
        let result = page
            .evaluate(wrap_script(script))
            .await
            .map_err(|e| match self.map_err(e) {
                BrowserError::ChromiumError(msg) => BrowserError::ScriptError(msg),
                other => other,
            })?;

        let envelope = result.value().cloned().unwrap_or(serde_json::Value::Null);
        if envelope.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
            Ok(envelope
                .get("value")
                .cloned()
                .unwrap_or(serde_json::Value::Null))
        } else {
            let message = envelope
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("script returned no result")
                .to_string();
            Err(BrowserError::ScriptError(message))
        }
    }

    async fn window_handles(&self) -> Result<Vec<WindowHandle>> {
        self.ensure_alive()?;
        let tabs = self.tabs.lock().await;
        Ok(tabs.pages.iter().map(|(h, _)| h.clone()).collect())
    }

    async fn current_window(&self) -> Result<WindowHandle> {
        self.ensure_alive()?;
        let tabs = self.tabs.lock().await;
        tabs.current
            .clone()
            .ok_or_else(|| BrowserError::WindowNotFound("no current window".to_string()))
    }

    async fn switch_to(&self, handle: &WindowHandle) -> Result<()> {
        self.ensure_alive()?;
        let page = {
            let mut tabs = self.tabs.lock().await;
            let page = tabs
                .get(handle)
                .cloned()
                .ok_or_else(|| BrowserError::WindowNotFound(handle.to_string()))?;
            tabs.current = Some(handle.clone());
            page
        };
        page.bring_to_front().await.map_err(|e| self.map_err(e))?;
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<WindowHandle> {
        check_url(url)?;
        self.ensure_alive()?;
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| self.map_err(e))?;
        let handle = WindowHandle::new(format!(
            "tab-{}",
            self.next_tab.fetch_add(1, Ordering::SeqCst)
        ));

        let mut tabs = self.tabs.lock().await;
        tabs.pages.push((handle.clone(), page));
        tabs.current = Some(handle.clone());
        Ok(handle)
    }

    async fn close_window(&self, handle: &WindowHandle) -> Result<()> {
        self.ensure_alive()?;
        let page = {
            let mut tabs = self.tabs.lock().await;
            let idx = tabs
                .pages
                .iter()
                .position(|(h, _)| h == handle)
                .ok_or_else(|| BrowserError::WindowNotFound(handle.to_string()))?;
            let (_, page) = tabs.pages.remove(idx);
            if tabs.current.as_ref() == Some(handle) {
                tabs.current = tabs.pages.first().map(|(h, _)| h.clone());
            }
            page
        };
        page.close().await.map_err(|e| self.map_err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lost_markers() {
        assert!(is_session_lost("invalid session id: no such session"));
        assert!(is_session_lost("Send failed because receiver is gone"));
        assert!(!is_session_lost("javascript error: Malformed UTF-8 data"));
    }

    #[test]
    fn test_wrap_script_keeps_body() {
        let wrapped = wrap_script("return getKey();");
        assert!(wrapped.contains("(function() { return getKey(); })()"));
        assert!(wrapped.starts_with("(() => {"));
        assert!(wrapped.ends_with("})()"));
    }
}
