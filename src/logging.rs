//! Logger setup. Android routes `log` records to logcat, other targets use env_logger.

use std::sync::Once;

pub const LOG_TAG: &str = "WalletKitBridge";

static INIT: Once = Once::new();

/// Install the platform logger. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag(LOG_TAG),
            );
        }
        #[cfg(not(target_os = "android"))]
        {
            // A host may already have installed its own logger
            let _ = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("info"),
            )
            .try_init();
        }
        log::info!("🌉 {} logging initialized", LOG_TAG);
    });
}
