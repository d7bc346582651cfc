//! `tracing` setup for the CLI and span helpers used while opening archives
//!
//! Library code only emits events. Installing a subscriber is left to the
//! binary (or a test) through [`init_with_config`].

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static SUBSCRIBER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the stderr subscriber with [`TracingConfig::default`]
pub fn init_default() {
    init_with_config(TracingConfig::default());
}

/// Install the stderr subscriber; later calls are no-ops
///
/// `RUST_LOG` overrides `config.filter` when set.
pub fn init_with_config(config: TracingConfig) {
    if SUBSCRIBER_INSTALLED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.show_target)
        .with_file(config.show_location)
        .with_line_number(config.show_location);

    // a host application may have installed its own subscriber
    let _ = tracing_subscriber::registry().with(layer).with(filter).try_init();
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directives, e.g. `"warn,wadforge_formats=debug"`
    pub filter: String,
    /// Print the module path of each event
    pub show_target: bool,
    /// Print source file and line
    pub show_location: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "warn,wadforge=info,wadforge_formats=info".to_string(),
            show_target: false,
            show_location: false,
        }
    }
}

impl TracingConfig {
    /// Filter for a `-v` count: 0 warn, 1 info, 2 debug, 3+ trace
    pub fn for_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        Self {
            filter: level.to_string(),
            show_target: verbosity >= 2,
            show_location: verbosity >= 3,
        }
    }
}

/// Log the outcome of an archive open
#[macro_export]
macro_rules! log_open_complete {
    ($format:expr, $entries:expr) => {
        tracing::debug!(
            format = %$format,
            entries = %$entries,
            "Archive opened"
        )
    };
}

/// Log a failed archive open
#[macro_export]
macro_rules! log_open_error {
    ($format:expr, $error:expr) => {
        tracing::error!(
            format = %$format,
            error = %$error,
            "Archive open failed"
        )
    };
}

/// Run an archive open inside an `open` span and log how it ended
pub fn instrument_open<T, E, F>(format: &str, size: usize, f: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    let span = tracing::info_span!("open", format = %format, size);
    let _guard = span.enter();

    let start = std::time::Instant::now();
    let result = f();
    let duration = start.elapsed();

    match &result {
        Ok(_) => tracing::debug!(elapsed_ms = %duration.as_millis(), "open finished"),
        Err(e) => log_open_error!(format, e),
    }

    result
}

/// Span wrapping a long per-entry loop
pub fn progress_span(operation: &str, total: usize) -> tracing::Span {
    tracing::info_span!("progress", operation = %operation, total = %total)
}

/// Debug event every 1000 items and at the end
pub fn log_progress(current: usize, total: usize) {
    if total > 0 && (current % 1000 == 0 || current == total) {
        let percent = (current as f64 / total as f64 * 100.0) as u32;
        tracing::debug!(current = %current, total = %total, percent = %percent, "progress");
    }
}
