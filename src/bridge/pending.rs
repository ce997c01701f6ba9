use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::errors::BridgeError;

/// One RPC call waiting for the engine
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub frame_id: String,
    pub message_id: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
}

impl PendingRequest {
    pub fn new(frame_id: impl Into<String>, message_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
            message_id: message_id.into(),
            method: method.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.timestamp
    }
}

/// In-flight requests keyed by `messageId`.
///
/// Inserts come from the UI thread, removals from engine completions on the
/// task scope; the map is sharded so neither side needs an outer lock.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    entries: DashMap<String, PendingRequest>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, returning the entry that was replaced
    pub fn put(&self, request: PendingRequest) -> Option<PendingRequest> {
        self.entries.insert(request.message_id.clone(), request)
    }

    /// Insert only if no request with the same id is in flight
    pub fn try_put(&self, request: PendingRequest) -> Result<(), BridgeError> {
        match self.entries.entry(request.message_id.clone()) {
            Entry::Occupied(existing) => Err(BridgeError::DuplicateMessageId(existing.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    /// Atomic remove-and-return
    pub fn take(&self, message_id: &str) -> Option<PendingRequest> {
        self.entries.remove(message_id).map(|(_, request)| request)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.entries.contains_key(message_id)
    }

    pub fn get(&self, message_id: &str) -> Option<PendingRequest> {
        self.entries.get(message_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove every entry older than `max_age` and hand them back
    pub fn drain_expired(&self, max_age: Duration) -> Vec<PendingRequest> {
        let cutoff = Utc::now() - max_age;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().timestamp < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        // Re-check under the shard lock: the entry may have completed or been
        // replaced by a fresh request since the scan
        expired
            .into_iter()
            .filter_map(|id| {
                self.entries
                    .remove_if(&id, |_, request| request.timestamp < cutoff)
                    .map(|(_, request)| request)
            })
            .collect()
    }

    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}
