//! JavaScript injected into pages.
//!
//! The bridge script runs once per frame. It tags the frame with an id,
//! forwards `bridge-request` envelopes to the native interface, resolves
//! replies pushed via `postMessage`, and falls back to polling
//! `hasResponse`/`pullResponse` for replies that never arrive that way.

use crate::bridge::protocol::{FRAME_ID_PROPERTY, MAIN_FRAME_ID};

/// Poll period for replies that were not pushed
pub const POLL_INTERVAL_MS: u32 = 250;

const BRIDGE_TEMPLATE: &str = r#"(function () {
  if (window.__walletKitBridgeInstalled) { return; }
  window.__walletKitBridgeInstalled = true;

  var native = window['__INTERFACE__'];
  if (!native) { return; }

  if (!window['__FRAME_PROPERTY__']) {
    window['__FRAME_PROPERTY__'] = window === window.top
      ? '__MAIN_FRAME__'
      : 'frame-' + Math.random().toString(36).slice(2) + Date.now().toString(36);
  }
  var frameId = window['__FRAME_PROPERTY__'];
  var pending = {};
  var listeners = [];

  function settle(response) {
    var entry = pending[response.messageId];
    if (!entry) { return; }
    delete pending[response.messageId];
    if (response.success) { entry.resolve(response.payload); } else { entry.reject(response.payload); }
  }

  window.addEventListener('message', function (event) {
    var data = event.data;
    if (typeof data === 'string') {
      try { data = JSON.parse(data); } catch (e) { return; }
    }
    if (!data || typeof data !== 'object') { return; }
    if (data.type === 'bridge-response') {
      settle(data);
      // Pushed copy arrived; drop the polling copy
      if (native.hasResponse(data.messageId)) { native.pullResponse(data.messageId); }
    } else if (data.type === 'bridge-event') {
      listeners.slice().forEach(function (listener) {
        try { listener(data.event); } catch (e) { console.error(e); }
      });
    }
  });

  setInterval(function () {
    Object.keys(pending).forEach(function (messageId) {
      if (!native.hasResponse(messageId)) { return; }
      var raw = native.pullResponse(messageId);
      if (!raw) { return; }
      try { settle(JSON.parse(raw)); } catch (e) { console.error(e); }
    });
  }, __POLL_INTERVAL__);

  window.walletKitBridge = {
    frameId: frameId,
    request: function (method, params) {
      var messageId = frameId + '-' + Date.now().toString(36) + '-' + Math.random().toString(36).slice(2);
      return new Promise(function (resolve, reject) {
        pending[messageId] = { resolve: resolve, reject: reject };
        native.postMessage(JSON.stringify({
          type: 'bridge-request',
          frameId: frameId,
          messageId: messageId,
          method: method,
          params: params
        }));
      });
    },
    onEvent: function (listener) {
      listeners.push(listener);
      return function () {
        listeners = listeners.filter(function (l) { return l !== listener; });
      };
    }
  };
})();"#;

const IFRAME_TEMPLATE: &str = r#"(function () {
  var source = __BRIDGE_SOURCE__;
  var frames = document.getElementsByTagName('iframe');
  for (var i = 0; i < frames.length; i++) {
    try {
      var win = frames[i].contentWindow;
      if (win && !win.__walletKitBridgeInstalled) { win.eval(source); }
    } catch (e) {
      // Cross-origin frame; it polls through its own interface binding
    }
  }
})();"#;

/// Script for one frame, bound to `interface_name`
pub fn bridge_script(interface_name: &str) -> String {
    BRIDGE_TEMPLATE
        .replace("__INTERFACE__", interface_name)
        .replace("__FRAME_PROPERTY__", FRAME_ID_PROPERTY)
        .replace("__MAIN_FRAME__", MAIN_FRAME_ID)
        .replace("__POLL_INTERVAL__", &POLL_INTERVAL_MS.to_string())
}

/// Script run in the top document that installs the bridge into every
/// reachable iframe, including ones created after the initial load
pub fn iframe_injection_script(interface_name: &str) -> String {
    // A JSON string literal is a valid JS string literal
    let source = serde_json::Value::String(bridge_script(interface_name)).to_string();
    IFRAME_TEMPLATE.replace("__BRIDGE_SOURCE__", &source)
}
