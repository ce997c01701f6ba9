use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::errors::EngineError;

/// Engine method that lists the sessions it currently holds
pub const LIST_SESSIONS_METHOD: &str = "listSessions";

/// The JavaScript wallet engine, seen from the bridge as an opaque RPC callee
#[async_trait]
pub trait WalletEngine: Send + Sync {
    /// Generic bridge call (`callBridgeMethod`)
    async fn call_bridge_method(&self, method: &str, params: Value) -> Result<Value, EngineError>;

    /// TonConnect request coming from a dApp frame
    async fn handle_ton_connect_request(
        &self,
        message_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, EngineError>;

    /// Ids of every live session the engine knows about
    async fn active_sessions(&self) -> Result<Vec<String>, EngineError> {
        let sessions = self.call_bridge_method(LIST_SESSIONS_METHOD, Value::Null).await?;
        parse_session_ids(&sessions)
    }
}

/// Accepts `["id", ...]`, `[{sessionId: "id"}, ...]` or `{items: [...]}`
pub fn parse_session_ids(value: &Value) -> Result<Vec<String>, EngineError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("items") {
            Some(Value::Array(items)) => items,
            _ => return Err(EngineError::UnexpectedResponse(format!("session list: {}", value))),
        },
        Value::Null => return Ok(Vec::new()),
        other => return Err(EngineError::UnexpectedResponse(format!("session list: {}", other))),
    };

    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id.clone()),
            Value::Object(session) => session
                .get("sessionId")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect())
}

/// One call as seen by a [`CallbackEngine`]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCall {
    /// Set for TonConnect requests, None for plain bridge calls
    pub message_id: Option<String>,
    pub method: String,
    pub params: Value,
}

pub type EngineCallback = Arc<dyn Fn(EngineCall) -> BoxFuture<'static, Result<Value, EngineError>> + Send + Sync>;

/// Engine backed by a single async closure; handy for hosts that already
/// have a message pump into the JS runtime
#[derive(Clone)]
pub struct CallbackEngine {
    callback: EngineCallback,
}

impl CallbackEngine {
    pub fn new(callback: EngineCallback) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl WalletEngine for CallbackEngine {
    async fn call_bridge_method(&self, method: &str, params: Value) -> Result<Value, EngineError> {
        (self.callback)(EngineCall {
            message_id: None,
            method: method.to_string(),
            params,
        })
        .await
    }

    async fn handle_ton_connect_request(
        &self,
        message_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, EngineError> {
        (self.callback)(EngineCall {
            message_id: Some(message_id.to_string()),
            method: method.to_string(),
            params,
        })
        .await
    }
}
