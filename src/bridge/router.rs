use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::Value;

use crate::bridge::channel::{ChannelHandler, FrameMessageChannel};
use crate::bridge::engine::WalletEngine;
use crate::bridge::frames;
use crate::bridge::pending::{PendingRequest, PendingRequestTable};
use crate::bridge::protocol::{
    normalize_params, BridgeRequest, BridgeResponse, InboundEnvelope, OutboundEnvelope, CONNECT_METHOD,
    MAIN_FRAME_ID,
};
use crate::bridge::registry::SessionWebViewRegistry;
use crate::bridge::scope::TaskScope;
use crate::bridge::webview::WebView;
use crate::config::BridgeConfig;
use crate::errors::BridgeError;

/// Caller-supplied sink for failures that never reach a page
pub type ErrorSink = Arc<dyn Fn(&BridgeError) + Send + Sync>;

/// Correlates dApp requests with engine replies for one WebView.
///
/// A request is recorded in the pending table, forwarded to the engine on the
/// task scope, and its reply is pushed back into the frame that sent it. The
/// pending entry is taken exactly once, by whichever of completion, timeout or
/// `postResponse` gets there first; the others find nothing and drop.
pub struct BridgeRequestRouter {
    me: Weak<BridgeRequestRouter>,
    webview: Weak<dyn WebView>,
    channel: Arc<FrameMessageChannel>,
    pending: Arc<PendingRequestTable>,
    registry: Arc<SessionWebViewRegistry>,
    engine: RwLock<Option<Arc<dyn WalletEngine>>>,
    error_sink: RwLock<Option<ErrorSink>>,
    scope: TaskScope,
    settle_delay: Duration,
    request_timeout: Option<Duration>,
}

impl BridgeRequestRouter {
    pub fn new(
        webview: &Arc<dyn WebView>,
        channel: Arc<FrameMessageChannel>,
        registry: Arc<SessionWebViewRegistry>,
        scope: TaskScope,
        config: &BridgeConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            webview: Arc::downgrade(webview),
            channel,
            pending: Arc::new(PendingRequestTable::new()),
            registry,
            engine: RwLock::new(None),
            error_sink: RwLock::new(None),
            scope,
            settle_delay: config.settle_delay(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Attach (or swap, after an engine restart) the wallet engine
    pub fn set_engine(&self, engine: Arc<dyn WalletEngine>) {
        info!("🔌 Bridge: wallet engine attached");
        *self.engine.write() = Some(engine);
    }

    pub fn clear_engine(&self) {
        info!("🔌 Bridge: wallet engine detached");
        *self.engine.write() = None;
    }

    pub fn has_engine(&self) -> bool {
        self.engine.read().is_some()
    }

    pub fn set_error_sink(&self, sink: Option<ErrorSink>) {
        *self.error_sink.write() = sink;
    }

    pub fn pending(&self) -> &Arc<PendingRequestTable> {
        &self.pending
    }

    pub fn channel(&self) -> &Arc<FrameMessageChannel> {
        &self.channel
    }

    /// Entry point for a `bridge-request` envelope from any frame
    pub fn handle_request(&self, request: BridgeRequest) {
        let Some(message_id) = request.message_id.filter(|id| !id.is_empty()) else {
            // Nothing to correlate a reply with
            error!("❌ Bridge: request without messageId dropped (method {:?})", request.method);
            self.report(&BridgeError::MissingField("messageId"));
            return;
        };
        let frame_id = request
            .frame_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| MAIN_FRAME_ID.to_string());
        let method = request.method.unwrap_or_default();

        debug!("Bridge: {} request {} from frame {}", method, message_id, frame_id);

        if let Err(e) = self
            .pending
            .try_put(PendingRequest::new(frame_id.clone(), message_id.clone(), method.clone()))
        {
            // The in-flight request keeps its slot; only the newcomer is refused
            warn!("⚠️  Bridge: {}", e);
            self.dispatch(&frame_id, BridgeResponse::failure(&message_id, &e), false);
            return;
        }

        if method.is_empty() {
            self.complete(&message_id, Err(BridgeError::MissingField("method")));
            return;
        }

        let engine = self.engine.read().clone();
        let Some(engine) = engine else {
            warn!("⚠️  Bridge: engine not ready for {} ({})", method, message_id);
            self.complete(&message_id, Err(BridgeError::EngineUnavailable));
            return;
        };
        let Some(router) = self.me.upgrade() else {
            return;
        };

        let params = normalize_params(&method, request.params);
        let task_id = message_id.clone();
        let spawned = self.scope.spawn(async move {
            let result = engine
                .handle_ton_connect_request(&task_id, &method, params)
                .await
                .map_err(BridgeError::from);
            router.complete(&task_id, result);
        });
        if spawned.is_none() {
            debug!("Bridge: scope closed, dropping request {}", message_id);
            self.pending.take(&message_id);
        }
    }

    /// Reply that came back through `postResponse` rather than from our own
    /// engine call
    pub fn route_response(&self, response: BridgeResponse) {
        let Some(request) = self.pending.take(&response.message_id) else {
            warn!(
                "⚠️  Bridge: no pending request for response {}, dropping",
                response.message_id
            );
            return;
        };
        let connected = request.method == CONNECT_METHOD && response.has_payload();
        let payload = connected.then(|| response.payload.clone());
        self.dispatch(&request.frame_id, response, true);
        if let Some(payload) = payload {
            self.correct_sessions(&request.message_id, &payload);
        }
    }

    /// Time out requests the engine never answered; returns how many
    pub fn expire_stale_requests(&self) -> usize {
        let Some(max_age) = self.request_timeout.and_then(|t| chrono::Duration::from_std(t).ok()) else {
            return 0;
        };
        let expired = self.pending.drain_expired(max_age);
        for request in &expired {
            warn!(
                "⏱️  Bridge: {} ({}) timed out after {}s",
                request.method,
                request.message_id,
                request.age().num_seconds()
            );
            let error = BridgeError::TimedOut(request.message_id.clone());
            self.dispatch(&request.frame_id, BridgeResponse::failure(&request.message_id, &error), true);
        }
        expired.len()
    }

    pub fn spawn_timeout_sweeper(&self, interval: Duration) {
        if self.request_timeout.is_none() {
            return;
        }
        let router = self.me.clone();
        self.scope.spawn_interval(interval, move || {
            if let Some(router) = router.upgrade() {
                router.expire_stale_requests();
            }
        });
    }

    fn complete(&self, message_id: &str, result: Result<Value, BridgeError>) {
        let Some(request) = self.pending.take(message_id) else {
            warn!("⚠️  Bridge: no pending request for {}, dropping engine reply", message_id);
            return;
        };

        let response = match result {
            Ok(payload) => BridgeResponse::success(message_id, payload),
            Err(e) => {
                warn!("❌ Bridge: {} ({}) failed: {}", request.method, message_id, e);
                BridgeResponse::failure(message_id, &e)
            }
        };

        let connected = request.method == CONNECT_METHOD && response.has_payload();
        let payload = connected.then(|| response.payload.clone());
        self.dispatch(&request.frame_id, response, true);
        if let Some(payload) = payload {
            self.correct_sessions(message_id, &payload);
        }
    }

    /// Serialize, keep a copy for polling, then push on the UI thread
    fn dispatch(&self, frame_id: &str, response: BridgeResponse, store: bool) {
        let message_id = response.message_id.clone();
        let json = match OutboundEnvelope::Response(response).to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("❌ Bridge: could not encode response {}: {}", message_id, e);
                self.report(&e);
                return;
            }
        };

        if store {
            self.channel.store_response(&message_id, json.clone());
        }

        let Some(webview) = self.webview.upgrade() else {
            debug!("Bridge: WebView gone, response {} left for polling", message_id);
            return;
        };
        let frame_id = frame_id.to_string();
        let target = Arc::clone(&webview);
        webview.run_on_ui_thread(Box::new(move || {
            if frames::post_to_frame(&*target, &frame_id, &json) {
                debug!("Bridge: response {} delivered to frame {}", message_id, frame_id);
            }
        }));
    }

    /// The engine does not say which session a fresh connect produced, so the
    /// WebView is registered under the request id now and, after a settle
    /// delay, under every session the engine reports. With several dApps
    /// connecting on different WebViews at once this can associate a session
    /// with the wrong one.
    fn correct_sessions(&self, message_id: &str, payload: &Value) {
        let Some(webview) = self.webview.upgrade() else {
            return;
        };
        self.registry.register(message_id, &webview);
        if let Some(session_id) = payload.get("sessionId").and_then(Value::as_str) {
            self.registry.register(session_id, &webview);
        }

        let engine = self.engine.read().clone();
        let Some(engine) = engine else {
            return;
        };
        let registry = Arc::clone(&self.registry);
        let target = Arc::downgrade(&webview);
        let delay = self.settle_delay;
        self.scope.spawn(async move {
            tokio::time::sleep(delay).await;
            match engine.active_sessions().await {
                Ok(sessions) => {
                    let Some(webview) = target.upgrade() else {
                        debug!("Bridge: WebView gone before session re-registration");
                        return;
                    };
                    info!("🔗 Bridge: re-registering {} session(s) after connect", sessions.len());
                    for session_id in sessions {
                        registry.register(session_id, &webview);
                    }
                }
                Err(e) => warn!("⚠️  Bridge: could not list sessions after connect: {}", e),
            }
        });
    }

    fn report(&self, error: &BridgeError) {
        let sink = self.error_sink.read().clone();
        if let Some(sink) = sink {
            sink(error);
        }
    }
}

impl ChannelHandler for BridgeRequestRouter {
    fn on_message(&self, message: InboundEnvelope) {
        match message {
            InboundEnvelope::Request(request) => self.handle_request(request),
            InboundEnvelope::Response(response) => self.route_response(response),
        }
    }

    fn on_error(&self, error: BridgeError) {
        self.report(&error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::testing::{flush, recording_engine, MockWebView};
    use serde_json::json;

    struct Harness {
        webview: Arc<MockWebView>,
        handle: Arc<dyn WebView>,
        router: Arc<BridgeRequestRouter>,
        registry: Arc<SessionWebViewRegistry>,
        scope: TaskScope,
    }

    fn harness(config: BridgeConfig) -> Harness {
        let webview = MockWebView::new();
        let handle = webview.handle();
        let registry = Arc::new(SessionWebViewRegistry::new());
        let scope = TaskScope::current().unwrap();
        let channel = Arc::new(FrameMessageChannel::new(config.response_store_capacity));
        let router = BridgeRequestRouter::new(&handle, channel, Arc::clone(&registry), scope.clone(), &config);
        Harness {
            webview,
            handle,
            router,
            registry,
            scope,
        }
    }

    fn request(frame: Option<&str>, id: Option<&str>, method: &str, params: Value) -> BridgeRequest {
        BridgeRequest {
            frame_id: frame.map(str::to_string),
            message_id: id.map(str::to_string),
            method: Some(method.to_string()),
            params,
        }
    }

    #[tokio::test]
    async fn test_connect_from_main_frame() {
        let h = harness(BridgeConfig::default());
        let (engine, calls) = recording_engine(|_| async { Ok(json!({"address": "EQwallet", "items": []})) });
        h.router.set_engine(engine);

        h.router.handle_request(request(None, Some("m1"), "connect", json!({"manifestUrl": "x"})));
        flush().await;

        assert_eq!(calls.lock()[0].message_id.as_deref(), Some("m1"));
        let delivered = h.webview.top().messages();
        assert_eq!(delivered.len(), 1);
        assert_eq!(
            delivered[0],
            json!({"type": "bridge-response", "messageId": "m1", "success": true,
                   "payload": {"address": "EQwallet", "items": []}})
        );
        assert!(h.router.pending().is_empty());

        let registered = h.registry.lookup("m1").unwrap();
        assert!(crate::bridge::webview::same_webview(&registered, &h.handle));
        h.scope.cancel();
    }

    #[tokio::test]
    async fn test_engine_error_goes_to_originating_iframe_only() {
        let h = harness(BridgeConfig::default());
        let other = h.webview.add_iframe("iframe-3");
        h.webview.add_cross_origin_iframe();
        let target = h.webview.add_iframe("iframe-7");
        let (engine, _) = recording_engine(|_| async { Err(EngineError::from("User declined the request")) });
        h.router.set_engine(engine);

        h.router.handle_request(request(Some("iframe-7"), Some("m2"), "signData", json!({})));
        flush().await;

        let delivered = target.messages();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0]["messageId"], "m2");
        assert_eq!(delivered[0]["success"], false);
        assert_eq!(
            delivered[0]["payload"],
            json!({"error": {"message": "User declined the request", "code": 500}})
        );
        assert!(other.messages().is_empty());
        assert!(h.webview.top().messages().is_empty());
        assert!(h.router.pending().is_empty());
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_missing_engine_still_resolves() {
        let h = harness(BridgeConfig::default());
        h.router.handle_request(request(None, Some("m3"), "connect", json!({})));

        let delivered = h.webview.top().messages();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0]["payload"]["error"]["code"], 500);
        assert_eq!(delivered[0]["payload"]["error"]["message"], "Wallet engine not initialized");
        assert!(h.router.pending().is_empty());
    }

    #[tokio::test]
    async fn test_missing_message_id_is_dropped() {
        let h = harness(BridgeConfig::default());
        let (engine, calls) = recording_engine(|_| async { Ok(json!({})) });
        h.router.set_engine(engine);
        let reported = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&reported);
        h.router
            .set_error_sink(Some(Arc::new(move |e: &BridgeError| sink_log.lock().push(e.to_string()))));

        h.router.handle_request(request(None, None, "connect", json!({})));
        flush().await;

        assert_eq!(h.webview.total_deliveries(), 0);
        assert!(calls.lock().is_empty());
        assert!(h.router.pending().is_empty());
        assert_eq!(reported.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_send_params_are_unwrapped() {
        let h = harness(BridgeConfig::default());
        let (engine, calls) = recording_engine(|_| async { Ok(json!({"boc": "te6"})) });
        h.router.set_engine(engine);
        let tx = json!({"valid_until": 100, "messages": [{"address": "EQx", "amount": "1"}]});

        h.router.handle_request(request(None, Some("m4"), "send", json!([tx.clone()])));
        h.router.handle_request(request(None, Some("m5"), "send", json!([])));
        h.router.handle_request(request(None, Some("m6"), "send", Value::Null));
        flush().await;

        let calls = calls.lock();
        let params_for = |id: &str| {
            calls
                .iter()
                .find(|c| c.message_id.as_deref() == Some(id))
                .map(|c| c.params.clone())
                .unwrap()
        };
        assert_eq!(params_for("m4"), tx);
        assert_eq!(params_for("m5"), json!([]));
        assert_eq!(params_for("m6"), Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_response_is_not_delivered() {
        let h = harness(BridgeConfig::default());
        h.webview.add_iframe("iframe-1");

        h.router.route_response(BridgeResponse::success("ghost", json!({"ok": true})));

        assert_eq!(h.webview.total_deliveries(), 0);
        assert!(!h.router.channel().has_response("ghost"));
    }

    #[tokio::test]
    async fn test_posted_response_is_routed_by_message_id() {
        let h = harness(BridgeConfig::default());
        let frame = h.webview.add_iframe("iframe-2");
        h.router.pending().put(PendingRequest::new("iframe-2", "m9", "signData"));

        h.router.route_response(BridgeResponse::success("m9", json!({"signature": "abc"})));

        assert_eq!(frame.messages()[0]["payload"]["signature"], "abc");
        assert!(h.router.pending().is_empty());
        assert!(h.router.channel().pull_response("m9").is_some());
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_is_rejected() {
        let h = harness(BridgeConfig::default());
        let first_frame = h.webview.add_iframe("iframe-1");
        let second_frame = h.webview.add_iframe("iframe-2");
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(parking_lot::Mutex::new(Some(gate)));
        let (engine, calls) = recording_engine(move |_| {
            let gate = gate.lock().take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(json!({"done": true}))
            }
        });
        h.router.set_engine(engine);

        h.router.handle_request(request(Some("iframe-1"), Some("dup"), "signData", json!({})));
        flush().await;
        h.router.handle_request(request(Some("iframe-2"), Some("dup"), "signData", json!({})));
        flush().await;

        let rejected = second_frame.messages();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0]["payload"]["error"]["code"], 500);
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(h.router.pending().get("dup").unwrap().frame_id, "iframe-1");

        release.send(()).unwrap();
        flush().await;
        assert_eq!(first_frame.messages()[0]["payload"], json!({"done": true}));
        assert_eq!(second_frame.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_completion() {
        let h = harness(BridgeConfig::default());
        let (engine, _) = recording_engine(|call| async move {
            let wait = if call.method == "slow" { 2 } else { 1 };
            tokio::time::sleep(Duration::from_secs(wait)).await;
            Ok(json!({"method": call.method}))
        });
        h.router.set_engine(engine);

        h.router.handle_request(request(None, Some("a"), "slow", json!({})));
        h.router.handle_request(request(None, Some("b"), "fast", json!({})));
        tokio::time::sleep(Duration::from_secs(3)).await;

        let ids: Vec<Value> = h.webview.top().messages().iter().map(|m| m["messageId"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_registered_after_settle_delay() {
        let config = BridgeConfig {
            settle_delay_ms: 500,
            ..BridgeConfig::default()
        };
        let h = harness(config);
        let (engine, _) = recording_engine(|call| async move {
            if call.method == crate::bridge::engine::LIST_SESSIONS_METHOD {
                Ok(json!([{"sessionId": "s1"}, {"sessionId": "s2"}]))
            } else {
                Ok(json!({"address": "EQwallet", "sessionId": "s0"}))
            }
        });
        h.router.set_engine(engine);

        h.router.handle_request(request(None, Some("m1"), "connect", json!({})));
        flush().await;
        assert!(h.registry.lookup("m1").is_some());
        assert!(h.registry.lookup("s0").is_some());
        assert!(h.registry.lookup("s1").is_none());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(h.registry.lookup("s1").is_some());
        assert!(h.registry.lookup("s2").is_some());
    }

    #[tokio::test]
    async fn test_timed_out_request_gets_error() {
        let config = BridgeConfig {
            request_timeout_ms: Some(1_000),
            ..BridgeConfig::default()
        };
        let h = harness(config);
        let mut stale = PendingRequest::new("main", "slow", "send");
        stale.timestamp = chrono::Utc::now() - chrono::Duration::seconds(5);
        h.router.pending().put(stale);
        h.router.pending().put(PendingRequest::new("main", "fresh", "send"));

        assert_eq!(h.router.expire_stale_requests(), 1);

        let delivered = h.webview.top().messages();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0]["messageId"], "slow");
        assert_eq!(delivered[0]["payload"]["error"]["code"], 500);
        assert!(h.router.pending().contains("fresh"));
    }

    #[tokio::test]
    async fn test_response_kept_for_polling_when_webview_is_gone() {
        let config = BridgeConfig::default();
        let webview = MockWebView::new();
        let handle = webview.handle();
        let channel = Arc::new(FrameMessageChannel::new(8));
        let router = BridgeRequestRouter::new(
            &handle,
            Arc::clone(&channel),
            Arc::new(SessionWebViewRegistry::new()),
            TaskScope::current().unwrap(),
            &config,
        );
        router.pending().put(PendingRequest::new("main", "m1", "signData"));
        drop(handle);
        drop(webview);

        router.route_response(BridgeResponse::success("m1", json!({"ok": 1})));

        assert!(channel.has_response("m1"));
        let stored: Value = serde_json::from_str(&channel.pull_response("m1").unwrap()).unwrap();
        assert_eq!(stored["payload"]["ok"], 1);
    }

    #[tokio::test]
    async fn test_cancelled_scope_abandons_in_flight_request() {
        let h = harness(BridgeConfig::default());
        let (engine, _) = recording_engine(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        });
        h.router.set_engine(engine);

        h.router.handle_request(request(None, Some("m1"), "send", json!({})));
        flush().await;
        h.scope.cancel();
        flush().await;

        assert_eq!(h.webview.total_deliveries(), 0);
        assert!(h.router.pending().contains("m1"));
    }
}
