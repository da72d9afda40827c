use harvest_browser::WindowHandle;
use std::time::Instant;

/// Credential material and rotation bookkeeping of the one browser session.
///
/// Only [`SessionScheduler::refresh`](crate::SessionScheduler::refresh)
/// writes it, and it replaces GUID and token together.
#[derive(Debug, Default)]
pub struct SessionState {
    /// `name=value` pairs joined by `"; "`
    pub cookie: String,
    /// Form-encoded session GUID
    pub guid: Option<String>,
    /// Form-encoded auth token
    pub token: Option<String>,
    /// Proxy endpoint used by direct HTTP calls
    pub proxy: Option<String>,
    /// When the exit IP last changed
    pub last_rotation: Option<Instant>,
    /// Exit IP granted by the last rotation
    pub last_ip: Option<String>,
    /// Tab used for cookie harvesting, recorded on first refresh
    pub main_window: Option<WindowHandle>,
    /// Bumped on every successful refresh
    pub generation: u64,
}

impl SessionState {
    /// Snapshot for callers, or `None` before the first successful refresh.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.guid, &self.token) {
            (Some(guid), Some(token)) => Some(Credentials {
                cookie: self.cookie.clone(),
                guid: guid.clone(),
                token: token.clone(),
                proxy: self.proxy.clone(),
                generation: self.generation,
            }),
            _ => None,
        }
    }
}

/// Read-only copy of the credentials needed by one API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub cookie: String,
    pub guid: String,
    pub token: String,
    pub proxy: Option<String>,
    pub generation: u64,
}
