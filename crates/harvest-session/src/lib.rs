//! Session credential scheduling.
//!
//! Owns the browser session used to mint the cookie string, session GUID and
//! auth token that bulk API calls need, and rotates the upstream proxy IP.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = SessionScheduler::new(driver, evaluator, limiter, store, options);
//! scheduler.initialize().await?;
//! if let Some(credentials) = scheduler.acquire().await {
//!     client.list(&credentials, &param, 1).await?;
//! }
//! ```

pub mod error;
pub mod proxy;
pub mod scheduler;
pub mod state;

pub use error::{Result, SessionError};
pub use proxy::{parse_switch_status, IpMonitor, ProxyStatus};
pub use scheduler::{BrowserGuard, SessionOptions, SessionScheduler};
pub use state::{Credentials, SessionState};
