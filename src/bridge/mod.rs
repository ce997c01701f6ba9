pub mod channel;
pub mod engine;
pub mod events;
pub(crate) mod frames;
pub mod lifecycle;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod scope;
pub mod script;
pub mod webview;

pub use channel::{ChannelHandler, FrameMessageChannel};
pub use engine::{CallbackEngine, EngineCall, EngineCallback, WalletEngine};
pub use events::EventBroadcaster;
pub use lifecycle::{BridgeLifecycle, BridgeOptions, PageEventSink};
pub use pending::{PendingRequest, PendingRequestTable};
pub use protocol::{BridgeEvent, BridgeRequest, BridgeResponse, InboundEnvelope, OutboundEnvelope};
pub use registry::SessionWebViewRegistry;
pub use router::{BridgeRequestRouter, ErrorSink};
pub use scope::TaskScope;
pub use webview::{ContentWindow, IframeElement, PageListener, UiTask, WebView};
