use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::BridgeError;

/// Name the channel is bound under in every frame
pub const DEFAULT_INTERFACE_NAME: &str = "WalletKitNative";

/// Bridge configuration for one WebView
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// JavaScript interface name the channel is exposed under
    pub interface_name: String,
    /// Wait after a successful connect before re-registering engine sessions
    pub settle_delay_ms: u64,
    /// Period of the stale session sweep
    pub registry_sweep_interval_ms: u64,
    /// Pending requests older than this get a timeout error (None disables)
    pub request_timeout_ms: Option<u64>,
    /// Period of the pending-request timeout sweep
    pub timeout_sweep_interval_ms: u64,
    /// Load progress (0-100) at which the bridge is pushed into iframes
    pub iframe_injection_progress: u8,
    /// Responses kept for `pullResponse` polling
    pub response_store_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            settle_delay_ms: 1_000,
            registry_sweep_interval_ms: 60_000,
            request_timeout_ms: Some(300_000),
            timeout_sweep_interval_ms: 10_000,
            iframe_injection_progress: 80,
            response_store_capacity: 256,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `WALLETKIT_BRIDGE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interface_name: std::env::var("WALLETKIT_BRIDGE_INTERFACE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.interface_name),
            settle_delay_ms: env_parse("WALLETKIT_BRIDGE_SETTLE_MS")
                .unwrap_or(defaults.settle_delay_ms),
            registry_sweep_interval_ms: env_parse("WALLETKIT_BRIDGE_SWEEP_MS")
                .unwrap_or(defaults.registry_sweep_interval_ms),
            request_timeout_ms: match std::env::var("WALLETKIT_BRIDGE_TIMEOUT_MS") {
                Ok(v) if v.trim() == "0" || v.to_lowercase() == "off" => None,
                Ok(v) => v.trim().parse().ok().or(defaults.request_timeout_ms),
                Err(_) => defaults.request_timeout_ms,
            },
            timeout_sweep_interval_ms: env_parse("WALLETKIT_BRIDGE_TIMEOUT_SWEEP_MS")
                .unwrap_or(defaults.timeout_sweep_interval_ms),
            iframe_injection_progress: env_parse("WALLETKIT_BRIDGE_IFRAME_PROGRESS")
                .unwrap_or(defaults.iframe_injection_progress),
            response_store_capacity: env_parse("WALLETKIT_BRIDGE_RESPONSE_CAPACITY")
                .unwrap_or(defaults.response_store_capacity),
        }
    }

    /// Check if the configuration is usable
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.interface_name.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("interface name is empty".into()));
        }
        if self.iframe_injection_progress > 100 {
            return Err(BridgeError::InvalidConfig(format!(
                "iframe injection progress {} is above 100",
                self.iframe_injection_progress
            )));
        }
        if self.registry_sweep_interval_ms == 0 || self.timeout_sweep_interval_ms == 0 {
            return Err(BridgeError::InvalidConfig("sweep intervals must be non-zero".into()));
        }
        if self.response_store_capacity == 0 {
            return Err(BridgeError::InvalidConfig("response store capacity must be non-zero".into()));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn registry_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.registry_sweep_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn timeout_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_sweep_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
