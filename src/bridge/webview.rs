//! Host browser surface the bridge drives.
//!
//! A platform adapter (Android `WebView` over JNI, wry, a test double)
//! implements these traits. Every method except `run_on_ui_thread` is only
//! called from inside a task handed to `run_on_ui_thread`, or from a page
//! callback that already runs on the UI thread.

use std::sync::{Arc, Weak};

use crate::bridge::channel::FrameMessageChannel;
use crate::errors::FrameAccessError;

pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// The `window` of one frame
pub trait ContentWindow: Send + Sync {
    /// Frame id the bridge script stored on this window, if it ran there
    fn frame_id(&self) -> Option<String>;

    /// `window.postMessage(message, '*')` with an already serialized envelope
    fn post_message(&self, message: &str);
}

/// An `<iframe>` element of the top document
pub trait IframeElement: Send + Sync {
    /// Fails for cross-origin frames that refuse scripted access
    fn content_window(&self) -> Result<Arc<dyn ContentWindow>, FrameAccessError>;
}

/// Navigation callbacks (WebViewClient / WebChromeClient on Android)
pub trait PageListener: Send + Sync {
    fn on_page_started(&self, url: &str);
    fn on_page_finished(&self, url: &str);
    fn on_progress_changed(&self, progress: u8);
    fn on_received_error(&self, url: &str, description: &str);
}

pub trait WebView: Send + Sync {
    /// Queue work on the thread that owns the view
    fn run_on_ui_thread(&self, task: UiTask);

    fn add_javascript_interface(&self, channel: Arc<FrameMessageChannel>, name: &str);

    fn remove_javascript_interface(&self, name: &str);

    fn set_page_listener(&self, listener: Option<Arc<dyn PageListener>>);

    fn evaluate_javascript(&self, script: &str);

    fn top_window(&self) -> Arc<dyn ContentWindow>;

    fn iframes(&self) -> Vec<Arc<dyn IframeElement>>;
}

/// Identity comparison that ignores vtable pointers
pub fn same_webview(a: &Arc<dyn WebView>, b: &Arc<dyn WebView>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

pub(crate) fn weak_points_to(weak: &Weak<dyn WebView>, webview: &Arc<dyn WebView>) -> bool {
    std::ptr::eq(weak.as_ptr() as *const (), Arc::as_ptr(webview) as *const ())
}
