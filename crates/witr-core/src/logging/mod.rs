//! Structured logging for witr.
//!
//! Dual-mode output on stderr:
//! - Human-readable console output for interactive use
//! - JSONL for scripts collecting diagnostics
//!
//! stdout is reserved for the report itself.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directive for witr's own crates at `level`.
pub fn filter_directive(level: LogLevel) -> String {
    format!("witr_core={level},witr_common={level}")
}

/// Initialize the logging subsystem.
///
/// Call once at startup. A second call is ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::new(filter_directive(config.level));

    let result = match config.format {
        LogFormat::Human => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_file(config.source_location)
                .with_line_number(config.source_location);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
    };
    // Already initialized (tests, embedding).
    let _ = result;
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}
