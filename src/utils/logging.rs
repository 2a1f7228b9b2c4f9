// Tracing subscriber setup for binaries embedding the workflow

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;

/// Filter directive scoping `level` to this crate
pub fn filter_directive(level: Level) -> String {
    let level = match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    };
    format!("comic_page_translator={},export_chapter={}", level, level)
}

/// Install the global fmt subscriber at the configured `LOG_LEVEL`
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::new(filter_directive(config.log_level()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
