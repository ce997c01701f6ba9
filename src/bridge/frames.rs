use log::{debug, warn};

use crate::bridge::protocol::MAIN_FRAME_ID;
use crate::bridge::webview::WebView;

/// Push a serialized envelope into exactly one frame.
///
/// Must run on the UI thread. Returns false when no frame carries `frame_id`;
/// the polling store is then the only way the page can still get the message.
pub(crate) fn post_to_frame(webview: &dyn WebView, frame_id: &str, message: &str) -> bool {
    if frame_id == MAIN_FRAME_ID {
        webview.top_window().post_message(message);
        return true;
    }

    for (index, iframe) in webview.iframes().iter().enumerate() {
        let window = match iframe.content_window() {
            Ok(window) => window,
            Err(e) => {
                debug!("Skipping iframe #{} while looking for {}: {}", index, frame_id, e);
                continue;
            }
        };
        if window.frame_id().as_deref() == Some(frame_id) {
            window.post_message(message);
            return true;
        }
    }

    warn!("⚠️  Bridge: no live frame with id {}", frame_id);
    false
}

/// Push to the top document and then every reachable iframe.
/// Returns how many frames received the message.
pub(crate) fn post_to_all_frames(webview: &dyn WebView, message: &str) -> usize {
    webview.top_window().post_message(message);
    let mut delivered = 1;

    for (index, iframe) in webview.iframes().iter().enumerate() {
        match iframe.content_window() {
            Ok(window) => {
                window.post_message(message);
                delivered += 1;
            }
            Err(e) => debug!("Skipping iframe #{} during broadcast: {}", index, e),
        }
    }
    delivered
}
