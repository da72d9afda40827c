//! Browser automation for the harvester.
//!
//! Provides the browser session driver used for credential harvesting,
//! the shared rate limiter, and evaluation of the site's own obfuscation
//! routines inside the page.

pub mod driver;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod limiter;
pub mod script;

pub use driver::{cookie_header, BrowserCookie, BrowserDriver, WindowHandle};
pub use engine::ChromeSession;
pub use error::{BrowserError, Result};
pub use fingerprint::{FingerprintConfig, ACCEPT_LANGUAGE, USER_AGENT};
pub use limiter::{Permit, RateLimiter};
pub use script::{BrowserScriptEvaluator, ScriptError, ScriptEvaluator};
