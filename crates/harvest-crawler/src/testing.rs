//! Scripted collaborators shared by the handler tests.

use harvest_browser::{
    BrowserCookie, BrowserDriver, BrowserError, RateLimiter, ScriptError, ScriptEvaluator,
    WindowHandle,
};
use harvest_db::Database;
use harvest_queue::{Task, TaskSink};
use harvest_session::{SessionOptions, SessionScheduler};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct BrowserState {
    url: String,
    navigations: Vec<String>,
    // successive sources per url; the last one sticks
    pages: HashMap<String, VecDeque<String>>,
    titles: HashMap<String, String>,
    // navigating to the key lands on the value
    redirects: HashMap<String, String>,
}

/// Browser whose pages are set up front.
#[derive(Default)]
pub struct ScriptedBrowser {
    state: Mutex<BrowserState>,
}

impl ScriptedBrowser {
    pub fn page(self, url: &str, sources: &[&str]) -> Self {
        self.state.lock().unwrap().pages.insert(
            url.to_string(),
            sources.iter().map(|s| (*s).to_string()).collect(),
        );
        self
    }

    pub fn title(self, url: &str, title: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .titles
            .insert(url.to_string(), title.to_string());
        self
    }

    pub fn redirect(self, from: &str, to: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .redirects
            .insert(from.to_string(), to.to_string());
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }
}

#[async_trait::async_trait]
impl BrowserDriver for ScriptedBrowser {
    async fn navigate(&self, url: &str) -> harvest_browser::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.navigations.push(url.to_string());
        s.url = s.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        Ok(())
    }
    async fn current_url(&self) -> harvest_browser::Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }
    async fn page_source(&self) -> harvest_browser::Result<String> {
        let mut s = self.state.lock().unwrap();
        let url = s.url.clone();
        let Some(sources) = s.pages.get_mut(&url) else {
            return Ok(String::new());
        };
        if sources.len() > 1 {
            Ok(sources.pop_front().unwrap_or_default())
        } else {
            Ok(sources.front().cloned().unwrap_or_default())
        }
    }
    async fn title(&self) -> harvest_browser::Result<String> {
        let s = self.state.lock().unwrap();
        Ok(s.titles.get(&s.url).cloned().unwrap_or_default())
    }
    async fn cookies(&self) -> harvest_browser::Result<Vec<BrowserCookie>> {
        Ok(vec![BrowserCookie {
            name: "vjkl5".to_string(),
            value: "123".to_string(),
        }])
    }
    async fn delete_all_cookies(&self) -> harvest_browser::Result<()> {
        Ok(())
    }
    async fn execute_script(&self, _script: &str) -> harvest_browser::Result<Value> {
        Err(BrowserError::ScriptError("not scripted".to_string()))
    }
    async fn window_handles(&self) -> harvest_browser::Result<Vec<WindowHandle>> {
        Ok(vec![WindowHandle::new("main")])
    }
    async fn current_window(&self) -> harvest_browser::Result<WindowHandle> {
        Ok(WindowHandle::new("main"))
    }
    async fn switch_to(&self, _handle: &WindowHandle) -> harvest_browser::Result<()> {
        Ok(())
    }
    async fn open_window(&self, _url: &str) -> harvest_browser::Result<WindowHandle> {
        Ok(WindowHandle::new("main"))
    }
    async fn close_window(&self, _handle: &WindowHandle) -> harvest_browser::Result<()> {
        Ok(())
    }
}

/// Evaluator answering payloads and identifiers from tables.
///
/// Unknown payloads throw; unknown identifiers are malformed; the
/// identifier `FAULT` throws.
#[derive(Default)]
pub struct ScriptedEvaluator {
    payloads: Mutex<HashMap<String, Value>>,
    ids: HashMap<String, String>,
}

impl ScriptedEvaluator {
    pub fn payload(self, payload: &str, value: Value) -> Self {
        self.payloads
            .lock()
            .unwrap()
            .insert(payload.to_string(), value);
        self
    }

    pub fn id(mut self, obfuscated: &str, id: &str) -> Self {
        self.ids.insert(obfuscated.to_string(), id.to_string());
        self
    }

    pub fn set_payload(&self, payload: &str, value: Value) {
        self.payloads
            .lock()
            .unwrap()
            .insert(payload.to_string(), value);
    }
}

#[async_trait::async_trait]
impl ScriptEvaluator for ScriptedEvaluator {
    async fn guid_fragment(&self) -> Result<String, ScriptError> {
        Ok("abcd".to_string())
    }
    async fn derive_token(&self) -> Result<String, ScriptError> {
        Ok("token".to_string())
    }
    async fn decode_payload(&self, payload: &str) -> Result<Value, ScriptError> {
        self.payloads
            .lock()
            .unwrap()
            .get(payload)
            .cloned()
            .ok_or_else(|| ScriptError::Fault("datalist is not defined".to_string()))
    }
    async fn decode_doc_id(&self, obfuscated: &str) -> Result<String, ScriptError> {
        if obfuscated == "FAULT" {
            return Err(ScriptError::Fault("unzip is not defined".to_string()));
        }
        self.ids
            .get(obfuscated)
            .cloned()
            .ok_or_else(|| ScriptError::MalformedEncoding("Malformed UTF-8 data".to_string()))
    }
}

/// Sink remembering every pushed task.
#[derive(Default)]
pub struct RecordingSink {
    tasks: Mutex<Vec<Task>>,
}

impl RecordingSink {
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }
}

impl TaskSink for RecordingSink {
    fn push(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }
}

pub struct Harness {
    pub browser: Arc<ScriptedBrowser>,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub session: Arc<SessionScheduler>,
    pub store: Arc<Database>,
    pub sink: Arc<RecordingSink>,
}

/// Wire an initialized session over the scripted collaborators.
pub async fn harness(browser: ScriptedBrowser, evaluator: ScriptedEvaluator) -> Harness {
    let browser = Arc::new(browser);
    let evaluator = Arc::new(evaluator);
    let store = Arc::new(Database::open(":memory:").await.expect("open database"));
    let options = SessionOptions {
        max_attempts: 2,
        ..SessionOptions::default()
    };
    let session = SessionScheduler::new(
        browser.clone(),
        evaluator.clone(),
        Arc::new(RateLimiter::new(1000.0)),
        store.clone(),
        options,
    );
    session.initialize().await.expect("initialize session");

    Harness {
        browser,
        evaluator,
        session: Arc::new(session),
        store,
        sink: Arc::new(RecordingSink::default()),
    }
}
