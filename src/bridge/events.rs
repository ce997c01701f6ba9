use std::sync::{Arc, Weak};

use log::{debug, info};
use parking_lot::Mutex;
use serde_json::Value;

use crate::bridge::frames;
use crate::bridge::protocol::{unwrap_engine_event, BridgeEvent, OutboundEnvelope};
use crate::bridge::registry::SessionWebViewRegistry;
use crate::bridge::webview::{weak_points_to, WebView};
use crate::errors::BridgeError;

/// Pushes unsolicited engine events (disconnect, state changes) into pages
pub struct EventBroadcaster {
    registry: Arc<SessionWebViewRegistry>,
    attached: Mutex<Vec<Weak<dyn WebView>>>,
}

impl EventBroadcaster {
    pub fn new(registry: Arc<SessionWebViewRegistry>) -> Self {
        Self {
            registry,
            attached: Mutex::new(Vec::new()),
        }
    }

    /// Track a WebView for page-wide events; held weakly
    pub fn attach(&self, webview: &Arc<dyn WebView>) {
        let mut attached = self.attached.lock();
        attached.retain(|weak| weak.strong_count() > 0 && !weak_points_to(weak, webview));
        attached.push(Arc::downgrade(webview));
    }

    pub fn detach(&self, webview: &Arc<dyn WebView>) {
        self.attached
            .lock()
            .retain(|weak| weak.strong_count() > 0 && !weak_points_to(weak, webview));
    }

    pub fn attached_count(&self) -> usize {
        self.attached.lock().iter().filter(|weak| weak.strong_count() > 0).count()
    }

    /// Deliver one engine event to the top document and every iframe of
    /// `webview`. Only the inner event reaches the page.
    pub fn broadcast(&self, webview: &Arc<dyn WebView>, envelope: Value) -> Result<(), BridgeError> {
        let (_, event) = unwrap_engine_event(envelope);
        let json = OutboundEnvelope::Event(BridgeEvent { event }).to_json()?;
        let target = Arc::clone(webview);
        webview.run_on_ui_thread(Box::new(move || {
            let delivered = frames::post_to_all_frames(&*target, &json);
            debug!("Bridge: event delivered to {} frame(s)", delivered);
        }));
        Ok(())
    }

    /// Route an engine event: to the session's WebView when the wrapper names
    /// a known session, otherwise to every attached WebView.
    /// Returns how many WebViews it was sent to.
    pub fn dispatch(&self, envelope: Value) -> Result<usize, BridgeError> {
        let session_id = envelope
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(webview) = session_id.as_deref().and_then(|id| self.registry.lookup(id)) {
            self.broadcast(&webview, envelope)?;
            return Ok(1);
        }

        let targets: Vec<Arc<dyn WebView>> = {
            let mut attached = self.attached.lock();
            attached.retain(|weak| weak.strong_count() > 0);
            attached.iter().filter_map(Weak::upgrade).collect()
        };
        if let Some(id) = session_id {
            info!("📣 Bridge: session {} not registered, broadcasting to {} WebView(s)", id, targets.len());
        }
        for webview in &targets {
            self.broadcast(webview, envelope.clone())?;
        }
        Ok(targets.len())
    }
}
