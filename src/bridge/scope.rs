use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::BridgeError;

/// Background tasks tied to one WebView. Cancelling the scope abandons every
/// task in it; there is no per-task cancellation.
#[derive(Clone, Debug)]
pub struct TaskScope {
    handle: Handle,
    token: CancellationToken,
}

impl TaskScope {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            token: CancellationToken::new(),
        }
    }

    /// Scope on the runtime the caller is running in
    pub fn current() -> Result<Self, BridgeError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| BridgeError::NoRuntime(e.to_string()))
    }

    /// Spawn `future`; returns None if the scope is already cancelled
    pub fn spawn<F>(&self, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.token.is_cancelled() {
            debug!("Bridge: task scope cancelled, not spawning");
            return None;
        }
        let token = self.token.clone();
        Some(self.handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = future => {}
            }
        }))
    }

    /// Run `tick` every `period` until the scope is cancelled.
    /// The first tick fires one period after spawning.
    pub fn spawn_interval<F>(&self, period: Duration, mut tick: F) -> Option<JoinHandle<()>>
    where
        F: FnMut() + Send + 'static,
    {
        self.spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick();
            }
        })
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A child scope is cancelled together with this one
    pub fn child(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            token: self.token.child_token(),
        }
    }
}
