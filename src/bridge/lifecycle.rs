use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info};

use crate::bridge::channel::{ChannelHandler, FrameMessageChannel};
use crate::bridge::engine::WalletEngine;
use crate::bridge::events::EventBroadcaster;
use crate::bridge::registry::SessionWebViewRegistry;
use crate::bridge::router::{BridgeRequestRouter, ErrorSink};
use crate::bridge::scope::TaskScope;
use crate::bridge::script;
use crate::bridge::webview::{PageListener, WebView};
use crate::config::BridgeConfig;
use crate::errors::BridgeError;

/// UI telemetry for page loads; every callback is optional
pub trait PageEventSink: Send + Sync {
    fn on_page_started(&self, _url: &str) {}
    fn on_page_finished(&self, _url: &str) {}
    fn on_page_error(&self, _url: &str, _description: &str) {}
}

/// Collaborators shared across WebViews
#[derive(Clone)]
pub struct BridgeOptions {
    pub registry: Arc<SessionWebViewRegistry>,
    pub engine: Option<Arc<dyn WalletEngine>>,
    pub broadcaster: Option<Arc<EventBroadcaster>>,
    pub page_events: Option<Arc<dyn PageEventSink>>,
    pub error_sink: Option<ErrorSink>,
}

impl BridgeOptions {
    pub fn new(registry: Arc<SessionWebViewRegistry>) -> Self {
        Self {
            registry,
            engine: None,
            broadcaster: None,
            page_events: None,
            error_sink: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn WalletEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<EventBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn with_page_events(mut self, sink: Arc<dyn PageEventSink>) -> Self {
        self.page_events = Some(sink);
        self
    }

    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }
}

/// Bridge wiring for one WebView.
///
/// Teardown is never triggered by the view being detached from its window:
/// approval sheets detach and reattach the WebView while a request is live.
/// The owner calls [`BridgeLifecycle::teardown`] when the page is really gone.
pub struct BridgeLifecycle {
    webview: Weak<dyn WebView>,
    interface_name: String,
    channel: Arc<FrameMessageChannel>,
    router: Arc<BridgeRequestRouter>,
    registry: Arc<SessionWebViewRegistry>,
    broadcaster: Option<Arc<EventBroadcaster>>,
    scope: TaskScope,
    torn_down: AtomicBool,
}

impl BridgeLifecycle {
    /// Must be called on the UI thread
    pub fn attach(
        webview: &Arc<dyn WebView>,
        config: BridgeConfig,
        scope: TaskScope,
        options: BridgeOptions,
    ) -> Result<Arc<Self>, BridgeError> {
        config.validate()?;

        let channel = Arc::new(FrameMessageChannel::new(config.response_store_capacity));
        let router = BridgeRequestRouter::new(
            webview,
            Arc::clone(&channel),
            Arc::clone(&options.registry),
            scope.clone(),
            &config,
        );
        if let Some(engine) = options.engine {
            router.set_engine(engine);
        }
        router.set_error_sink(options.error_sink);

        let handler: Arc<dyn ChannelHandler> = Arc::clone(&router) as Arc<dyn ChannelHandler>;
        channel.set_handler(Arc::downgrade(&handler));
        webview.add_javascript_interface(Arc::clone(&channel), &config.interface_name);

        let listener: Arc<dyn PageListener> =
            Arc::new(BridgePageListener::new(webview, &config, options.page_events));
        webview.set_page_listener(Some(listener));

        options.registry.spawn_sweeper(&scope, config.registry_sweep_interval());
        router.spawn_timeout_sweeper(config.timeout_sweep_interval());

        if let Some(broadcaster) = &options.broadcaster {
            broadcaster.attach(webview);
        }

        info!("🌉 Bridge: attached as window.{}", config.interface_name);

        Ok(Arc::new(Self {
            webview: Arc::downgrade(webview),
            interface_name: config.interface_name,
            channel,
            router,
            registry: options.registry,
            broadcaster: options.broadcaster,
            scope,
            torn_down: AtomicBool::new(false),
        }))
    }

    pub fn router(&self) -> &Arc<BridgeRequestRouter> {
        &self.router
    }

    pub fn channel(&self) -> &Arc<FrameMessageChannel> {
        &self.channel
    }

    pub fn scope(&self) -> &TaskScope {
        &self.scope
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Idempotent; in-flight engine calls are abandoned without a reply
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            debug!("Bridge: teardown already done");
            return;
        }

        self.scope.cancel();

        if let Some(webview) = self.webview.upgrade() {
            self.registry.unregister_all_for_webview(&webview);
            if let Some(broadcaster) = &self.broadcaster {
                broadcaster.detach(&webview);
            }
            webview.set_page_listener(None);
            webview.remove_javascript_interface(&self.interface_name);
        } else {
            self.registry.sweep_stale();
        }

        self.channel.clear_handler();
        let abandoned = self.router.pending().clear();
        self.channel.clear_responses();

        info!("🧹 Bridge: torn down ({} pending request(s) abandoned)", abandoned);
    }
}

/// Re-injects the bridge as pages and iframes load
struct BridgePageListener {
    webview: Weak<dyn WebView>,
    bridge_script: String,
    iframe_script: String,
    iframe_threshold: u8,
    iframes_injected: AtomicBool,
    sink: Option<Arc<dyn PageEventSink>>,
}

impl BridgePageListener {
    fn new(webview: &Arc<dyn WebView>, config: &BridgeConfig, sink: Option<Arc<dyn PageEventSink>>) -> Self {
        Self {
            webview: Arc::downgrade(webview),
            bridge_script: script::bridge_script(&config.interface_name),
            iframe_script: script::iframe_injection_script(&config.interface_name),
            iframe_threshold: config.iframe_injection_progress,
            iframes_injected: AtomicBool::new(false),
            sink,
        }
    }
}

impl PageListener for BridgePageListener {
    fn on_page_started(&self, url: &str) {
        self.iframes_injected.store(false, Ordering::Release);
        if let Some(sink) = &self.sink {
            sink.on_page_started(url);
        }
    }

    fn on_page_finished(&self, url: &str) {
        if let Some(webview) = self.webview.upgrade() {
            debug!("Bridge: injecting bridge into {}", url);
            webview.evaluate_javascript(&self.bridge_script);
        }
        if let Some(sink) = &self.sink {
            sink.on_page_finished(url);
        }
    }

    fn on_progress_changed(&self, progress: u8) {
        if progress < self.iframe_threshold || self.iframes_injected.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(webview) = self.webview.upgrade() {
            debug!("Bridge: load at {}%, injecting bridge into iframes", progress);
            webview.evaluate_javascript(&self.iframe_script);
        }
    }

    fn on_received_error(&self, url: &str, description: &str) {
        if let Some(sink) = &self.sink {
            sink.on_page_error(url, description);
        }
    }
}
