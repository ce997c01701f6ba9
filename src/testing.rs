//! In-memory WebView and engine doubles for unit tests

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;

use crate::bridge::channel::FrameMessageChannel;
use crate::bridge::engine::{CallbackEngine, EngineCall, WalletEngine};
use crate::bridge::webview::{ContentWindow, IframeElement, PageListener, UiTask, WebView};
use crate::errors::{EngineError, FrameAccessError};

/// Let spawned tasks on the current-thread test runtime run to completion
pub async fn flush() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Engine backed by `respond`, recording every call it receives
pub fn recording_engine<F, Fut>(respond: F) -> (Arc<dyn WalletEngine>, Arc<Mutex<Vec<EngineCall>>>)
where
    F: Fn(EngineCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, EngineError>> + Send + 'static,
{
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);
    let engine = CallbackEngine::new(Arc::new(move |call: EngineCall| {
        recorded.lock().push(call.clone());
        respond(call).boxed()
    }));
    (Arc::new(engine), calls)
}

pub struct MockWindow {
    frame_id: Option<String>,
    messages: Mutex<Vec<String>>,
}

impl MockWindow {
    fn new(frame_id: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            frame_id: frame_id.map(str::to_string),
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn raw_messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn messages(&self) -> Vec<Value> {
        self.messages
            .lock()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap_or(Value::String(raw.clone())))
            .collect()
    }
}

impl ContentWindow for MockWindow {
    fn frame_id(&self) -> Option<String> {
        self.frame_id.clone()
    }

    fn post_message(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// `window: None` behaves like a cross-origin frame
pub struct MockIframe {
    window: Option<Arc<MockWindow>>,
}

impl IframeElement for MockIframe {
    fn content_window(&self) -> Result<Arc<dyn ContentWindow>, FrameAccessError> {
        match &self.window {
            Some(window) => Ok(Arc::clone(window) as Arc<dyn ContentWindow>),
            None => Err(FrameAccessError::from("Blocked a frame from accessing a cross-origin frame")),
        }
    }
}

/// WebView whose UI thread is the calling thread
pub struct MockWebView {
    top: Arc<MockWindow>,
    iframes: Mutex<Vec<Arc<MockIframe>>>,
    interfaces: Mutex<HashMap<String, Arc<FrameMessageChannel>>>,
    listener: Mutex<Option<Arc<dyn PageListener>>>,
    scripts: Mutex<Vec<String>>,
}

impl MockWebView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            top: MockWindow::new(Some(crate::bridge::protocol::MAIN_FRAME_ID)),
            iframes: Mutex::new(Vec::new()),
            interfaces: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
            scripts: Mutex::new(Vec::new()),
        })
    }

    pub fn handle(self: &Arc<Self>) -> Arc<dyn WebView> {
        Arc::clone(self) as Arc<dyn WebView>
    }

    pub fn top(&self) -> Arc<MockWindow> {
        Arc::clone(&self.top)
    }

    pub fn add_iframe(&self, frame_id: &str) -> Arc<MockWindow> {
        let window = MockWindow::new(Some(frame_id));
        self.iframes.lock().push(Arc::new(MockIframe {
            window: Some(Arc::clone(&window)),
        }));
        window
    }

    pub fn add_cross_origin_iframe(&self) {
        self.iframes.lock().push(Arc::new(MockIframe { window: None }));
    }

    pub fn interface(&self, name: &str) -> Option<Arc<FrameMessageChannel>> {
        self.interfaces.lock().get(name).cloned()
    }

    pub fn listener(&self) -> Option<Arc<dyn PageListener>> {
        self.listener.lock().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }

    /// Messages pushed into any frame of this WebView
    pub fn total_deliveries(&self) -> usize {
        let iframes: usize = self
            .iframes
            .lock()
            .iter()
            .filter_map(|iframe| iframe.window.as_ref())
            .map(|window| window.messages.lock().len())
            .sum();
        self.top.messages.lock().len() + iframes
    }
}

impl WebView for MockWebView {
    fn run_on_ui_thread(&self, task: UiTask) {
        task();
    }

    fn add_javascript_interface(&self, channel: Arc<FrameMessageChannel>, name: &str) {
        self.interfaces.lock().insert(name.to_string(), channel);
    }

    fn remove_javascript_interface(&self, name: &str) {
        self.interfaces.lock().remove(name);
    }

    fn set_page_listener(&self, listener: Option<Arc<dyn PageListener>>) {
        *self.listener.lock() = listener;
    }

    fn evaluate_javascript(&self, script: &str) {
        self.scripts.lock().push(script.to_string());
    }

    fn top_window(&self) -> Arc<dyn ContentWindow> {
        Arc::clone(&self.top) as Arc<dyn ContentWindow>
    }

    fn iframes(&self) -> Vec<Arc<dyn IframeElement>> {
        self.iframes
            .lock()
            .iter()
            .map(|iframe| Arc::clone(iframe) as Arc<dyn IframeElement>)
            .collect()
    }
}
