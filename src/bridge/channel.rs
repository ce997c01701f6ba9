use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};

use crate::bridge::protocol::{BridgeResponse, InboundEnvelope};
use crate::errors::BridgeError;

/// Receiver of everything that comes in through the channel
pub trait ChannelHandler: Send + Sync {
    fn on_message(&self, message: InboundEnvelope);
    fn on_error(&self, error: BridgeError);
}

/// Object bound into every frame under the bridge interface name.
///
/// Page scripts call `postMessage` / `postResponse` to reach the host and
/// `hasResponse` / `pullResponse` to poll for replies when a pushed
/// `postMessage` never arrived (cross-origin frames, script not ready yet).
pub struct FrameMessageChannel {
    handler: RwLock<Option<Weak<dyn ChannelHandler>>>,
    responses: Mutex<ResponseStore>,
}

impl FrameMessageChannel {
    pub fn new(response_capacity: usize) -> Self {
        Self {
            handler: RwLock::new(None),
            responses: Mutex::new(ResponseStore::new(response_capacity)),
        }
    }

    /// The channel only keeps a weak handle; whoever owns the handler
    /// decides how long it lives
    pub fn set_handler(&self, handler: Weak<dyn ChannelHandler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self.handler.write() = None;
    }

    /// `postMessage(message)` from any frame
    pub fn post_message(&self, message: &str) {
        let Some(handler) = self.handler() else {
            warn!("⚠️  Bridge: message received with no handler attached, dropping");
            return;
        };
        match InboundEnvelope::parse(message) {
            Ok(envelope) => handler.on_message(envelope),
            Err(e) => {
                error!("❌ Bridge: failed to parse inbound message: {}", e);
                handler.on_error(e);
            }
        }
    }

    /// `postResponse(message)`: an engine reply that has to be routed back
    /// into the page. The `type` field is optional on this path.
    pub fn post_response(&self, message: &str) {
        let Some(handler) = self.handler() else {
            warn!("⚠️  Bridge: response received with no handler attached, dropping");
            return;
        };
        match serde_json::from_str::<BridgeResponse>(message) {
            Ok(response) => handler.on_message(InboundEnvelope::Response(response)),
            Err(e) => {
                error!("❌ Bridge: failed to parse posted response: {}", e);
                handler.on_error(BridgeError::from(e));
            }
        }
    }

    /// `pullResponse(id)`: at most once per stored response
    pub fn pull_response(&self, message_id: &str) -> Option<String> {
        let taken = self.responses.lock().take(message_id);
        if taken.is_some() {
            debug!("Bridge: response {} pulled by page", message_id);
        }
        taken
    }

    /// `hasResponse(id)`
    pub fn has_response(&self, message_id: &str) -> bool {
        self.responses.lock().contains(message_id)
    }

    /// Keep a serialized response available for polling
    pub fn store_response(&self, message_id: &str, message: String) {
        self.responses.lock().insert(message_id, message);
    }

    pub fn stored_responses(&self) -> usize {
        self.responses.lock().len()
    }

    pub fn clear_responses(&self) {
        self.responses.lock().clear();
    }

    fn handler(&self) -> Option<Arc<dyn ChannelHandler>> {
        self.handler.read().as_ref().and_then(Weak::upgrade)
    }
}

/// Bounded map of serialized responses; the oldest entry goes first when full
struct ResponseStore {
    capacity: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl ResponseStore {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, id: &str, message: String) {
        if self.entries.insert(id.to_string(), message).is_none() {
            self.order.push_back(id.to_string());
        }
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    if self.entries.remove(&oldest).is_some() {
                        debug!("Bridge: evicted unpolled response {}", oldest);
                    }
                }
                None => break,
            }
        }
    }

    fn take(&mut self, id: &str) -> Option<String> {
        let taken = self.entries.remove(id);
        if taken.is_some() {
            self.order.retain(|queued| queued != id);
        }
        taken
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
