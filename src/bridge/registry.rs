use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info};
use once_cell::sync::Lazy;

use crate::bridge::scope::TaskScope;
use crate::bridge::webview::{weak_points_to, WebView};

static GLOBAL_REGISTRY: Lazy<Arc<SessionWebViewRegistry>> =
    Lazy::new(|| Arc::new(SessionWebViewRegistry::new()));

/// Session id → owning WebView, held weakly.
///
/// A strong handle here would keep a closed WebView (and its JS heap) alive
/// for the rest of the process. Dead entries are dropped lazily on lookup,
/// after every `register`, and by the periodic sweeper.
#[derive(Default)]
pub struct SessionWebViewRegistry {
    sessions: DashMap<String, Weak<dyn WebView>>,
}

impl SessionWebViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance for hosts that want a single registry
    pub fn global() -> Arc<SessionWebViewRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    pub fn register(&self, session_id: impl Into<String>, webview: &Arc<dyn WebView>) {
        let session_id = session_id.into();
        debug!("Bridge: registering session {}", session_id);
        self.sessions.insert(session_id, Arc::downgrade(webview));
        self.sweep_stale();
    }

    pub fn unregister(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn lookup(&self, session_id: &str) -> Option<Arc<dyn WebView>> {
        // The shard guard is released before any eviction below
        let upgraded = self.sessions.get(session_id).map(|entry| entry.value().upgrade());
        match upgraded {
            None => None,
            Some(Some(webview)) => Some(webview),
            Some(None) => {
                self.sessions
                    .remove_if(session_id, |_, weak| weak.strong_count() == 0);
                debug!("Bridge: evicted stale session {}", session_id);
                None
            }
        }
    }

    /// Drop every session that points at `webview`; returns how many
    pub fn unregister_all_for_webview(&self, webview: &Arc<dyn WebView>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, weak| !weak_points_to(weak, webview));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!("🧹 Bridge: unregistered {} session(s) for closing WebView", removed);
        }
        removed
    }

    pub fn sweep_stale(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, weak| weak.strong_count() > 0);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!("Bridge: swept {} stale session(s)", removed);
        }
        removed
    }

    pub fn clear_all(&self) {
        self.sessions.clear();
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Periodic stale sweep on `scope`
    pub fn spawn_sweeper(self: &Arc<Self>, scope: &TaskScope, interval: Duration) {
        let registry = Arc::downgrade(self);
        scope.spawn_interval(interval, move || {
            if let Some(registry) = registry.upgrade() {
                registry.sweep_stale();
            }
        });
    }
}
