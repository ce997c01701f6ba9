use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BridgeError;

/// Frame id reserved for the top-level document
pub const MAIN_FRAME_ID: &str = "main";

/// Window property the injected bridge script stores its frame id under
pub const FRAME_ID_PROPERTY: &str = "__walletKitFrameId";

/// Code carried by every internally generated error envelope
pub const ERROR_CODE_INTERNAL: u16 = 500;

pub const CONNECT_METHOD: &str = "connect";
pub const SEND_METHOD: &str = "send";

/// Messages sent from page scripts to the host
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum InboundEnvelope {
    /// RPC call issued by a dApp
    #[serde(rename = "bridge-request")]
    Request(BridgeRequest),

    /// Engine reply handed back through `postResponse`
    #[serde(rename = "bridge-response")]
    Response(BridgeResponse),
}

impl InboundEnvelope {
    pub fn parse(message: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(message)?)
    }
}

/// Messages sent from the host into a frame
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum OutboundEnvelope {
    #[serde(rename = "bridge-response")]
    Response(BridgeResponse),

    #[serde(rename = "bridge-event")]
    Event(BridgeEvent),
}

impl OutboundEnvelope {
    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(BridgeError::Encode)
    }
}

/// `messageId` and `frameId` stay optional here so a request missing them
/// still parses and the router can decide what to do with it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    pub message_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub payload: Value,
}

impl BridgeResponse {
    /// Wrap an engine result. A payload shaped like `{error: ...}` is reported
    /// as unsuccessful even though the engine call itself returned.
    pub fn success(message_id: impl Into<String>, payload: Value) -> Self {
        let success = !is_error_shaped(&payload);
        Self {
            message_id: message_id.into(),
            success,
            payload,
        }
    }

    pub fn failure(message_id: impl Into<String>, error: &BridgeError) -> Self {
        Self {
            message_id: message_id.into(),
            success: false,
            payload: error.to_error_payload(),
        }
    }

    /// True when this is a successful reply that actually carries data
    pub fn has_payload(&self) -> bool {
        self.success && !self.payload.is_null()
    }
}

/// Unsolicited engine event as delivered to pages
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BridgeEvent {
    pub event: Value,
}

pub fn is_error_shaped(payload: &Value) -> bool {
    payload.get("error").map(|e| !e.is_null()).unwrap_or(false)
}

/// `send` arrives as `[transaction]`; one level of array is peeled off.
/// Anything else, including an empty array, is forwarded untouched.
pub fn normalize_params(method: &str, params: Value) -> Value {
    if method != SEND_METHOD {
        return params;
    }
    match params {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

/// Split an engine event wrapper into its session id (if any) and the
/// inner event. Routing fields on the wrapper never reach the page.
pub fn unwrap_engine_event(envelope: Value) -> (Option<String>, Value) {
    match envelope {
        Value::Object(mut outer) => {
            let session_id = outer
                .get("sessionId")
                .and_then(Value::as_str)
                .map(str::to_string);
            // A bare TonConnect event also has an `event` key, but a string one
            match outer.remove("event") {
                Some(inner @ Value::Object(_)) => (session_id, inner),
                Some(name) => {
                    outer.insert("event".to_string(), name);
                    (session_id, Value::Object(outer))
                }
                None => (session_id, Value::Object(outer)),
            }
        }
        other => (None, other),
    }
}
