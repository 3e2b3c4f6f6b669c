//! Log setup. On Android the `log` facade is wired to logcat; elsewhere the
//! host application installs its own logger and only the level is applied.

use std::sync::Once;

use log::{info, LevelFilter};

/// Logcat tag for every message from this library
pub const LOG_TAG: &str = "ExDevice";

static INIT_LOGGER: Once = Once::new();

/// Initialize logging once per process; later calls are ignored
pub fn init_logging(level: LevelFilter) {
    INIT_LOGGER.call_once(|| {
        #[cfg(target_os = "android")]
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(level)
                .with_tag(LOG_TAG),
        );

        #[cfg(not(target_os = "android"))]
        log::set_max_level(level);

        info!("ExDevice dispatch initialized");
        info!("Protocol version: {}", exdevice_protocol::VERSION);
    });
}
