use serde_json::{json, Value};
use thiserror::Error;

use crate::bridge::protocol::ERROR_CODE_INTERNAL;

/// Message used when the engine fails without saying why
pub const GENERIC_ENGINE_FAILURE: &str = "Unknown wallet engine error";

/// Errors reported by a wallet engine implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The engine rejected or failed the call; carries the engine's own message
    #[error("{0}")]
    Failed(String),

    /// The engine is not loaded (not yet initialized or restarting)
    #[error("Wallet engine not initialized")]
    Unavailable,

    /// The engine answered with something the bridge cannot interpret
    #[error("Unexpected engine response: {0}")]
    UnexpectedResponse(String),
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Failed(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Failed(s.to_string())
    }
}

/// Errors raised inside the bridge layer.
///
/// None of these cross the JavaScript boundary as panics: they are either
/// rendered into an error envelope for the originating frame or logged.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed bridge envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),

    #[error("Bridge envelope is missing `{0}`")]
    MissingField(&'static str),

    #[error("Wallet engine not initialized")]
    EngineUnavailable,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Duplicate in-flight messageId: {0}")]
    DuplicateMessageId(String),

    #[error("Request {0} timed out")]
    TimedOut(String),

    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid bridge configuration: {0}")]
    InvalidConfig(String),

    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}

impl BridgeError {
    /// Text shown to the dApp in the error envelope
    pub fn page_message(&self) -> String {
        match self {
            BridgeError::Engine(EngineError::Failed(message)) if message.trim().is_empty() => {
                GENERIC_ENGINE_FAILURE.to_string()
            }
            BridgeError::Engine(EngineError::Failed(message)) => message.clone(),
            other => other.to_string(),
        }
    }

    /// `{error: {message, code}}`; every internal failure shares one code
    pub fn to_error_payload(&self) -> Value {
        json!({
            "error": {
                "message": self.page_message(),
                "code": ERROR_CODE_INTERNAL,
            }
        })
    }
}

/// Scripted access to a frame was refused (typically a cross-origin iframe)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Frame access denied: {0}")]
pub struct FrameAccessError(pub String);

impl From<&str> for FrameAccessError {
    fn from(s: &str) -> Self {
        FrameAccessError(s.to_string())
    }
}
