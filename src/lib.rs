//! Host-side bridge between dApp frames in a WebView and a TON wallet engine.
//!
//! Pages talk to the host through a JavaScript interface bound into every
//! frame. Requests are correlated by `messageId`, forwarded to the wallet
//! engine, and the replies are pushed back into the frame that asked.
//! Sessions are mapped to their WebView weakly so a closed page is never kept
//! alive by the bridge.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod logging;

#[cfg(test)]
mod testing;

pub use bridge::{
    BridgeLifecycle, BridgeOptions, BridgeRequestRouter, EventBroadcaster, FrameMessageChannel, SessionWebViewRegistry,
    TaskScope, WalletEngine, WebView,
};
pub use config::BridgeConfig;
pub use errors::{BridgeError, EngineError, FrameAccessError};
