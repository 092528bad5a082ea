// Logging System for Constellation
//
// This module provides a unified logging interface for the Constellation
// runtime. It's built on top of the `tracing` ecosystem, which offers
// structured logging and spans that follow an activity across executors.
//
// # Usage Examples
//
// ## Basic Initialization
//
// ```rust
// use constellation::logging;
//
// // Initialize with default settings (INFO level, console output)
// logging::init_default();
//
// // Or initialize with custom settings
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// ## Development and Production
//
// ```rust
// use constellation::logging;
//
// // DEBUG level, colored output, file/line info, pool traffic at TRACE
// logging::init_development();
//
// // INFO level, JSON, no file/line info
// logging::init_production();
// ```
//
// ## Using Log Macros
//
// ```rust
// use constellation::{activity_span, log_lifecycle, log_steal};
//
// let span = activity_span!("AID:0:1:7", "fib");
// let _guard = span.enter();
//
// log_lifecycle!("AID:0:1:7", "fib", "finished");
// log_steal!("remote", "request_sent", pool = "WORLD");
// ```

use std::io;
use std::sync::Once;

use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[doc(hidden)]
pub use tracing;

/// Configuration for the Constellation logging system
///
/// # Examples
///
/// ```rust
/// use constellation::logging::LogConfig;
/// use tracing::Level;
///
/// let custom_config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     show_file_line: false,
///     show_thread_info: true,
///     show_time: true,
///     target_filters: Some("constellation=debug,constellation::pool=trace".to_string()),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id (executor threads are named)
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());
    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }
    env_filter
}

/// Initialize the logging system with the given configuration
///
/// It's safe to call multiple times; only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = match (config.json_format, config.show_time) {
            (true, _) => Box::new(registry.with(fmt::layer().json().flatten_event(true))),
            (false, true) => Box::new(
                registry.with(
                    fmt::layer()
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            ),
            (false, false) => Box::new(
                registry.with(
                    fmt::layer()
                        .without_time()
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            ),
        };

        set_global_subscriber(subscriber);
    });
}

// Helper function to set the global subscriber
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open a log file in append mode, creating it if it doesn't exist
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// Initialize logging with both console and file output
///
/// Console output respects the ansi color setting, while file output is
/// always plain. The file is opened up front so a bad path is reported
/// instead of silently falling back to stderr.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    file_writer(log_file)?;

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(std::io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// Initialize default logging: INFO level with human-readable console output
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging optimized for development environments
///
/// - DEBUG level for all Constellation modules
/// - TRACE level for pool coordination and wire traffic
/// - Colorized console output with file/line information
/// - Thread names and IDs displayed
pub fn init_development() {
    init(development_config());
}

fn development_config() -> LogConfig {
    LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("constellation=debug,constellation::pool=trace".to_string()),
    }
}

/// Initialize logging with development settings and a file output
pub fn init_development_with_file(path: &str) -> Result<(), io::Error> {
    init_with_file(development_config(), path)
}

/// Initialize logging optimized for production environments
///
/// JSON formatted output for log aggregators, no file/line information.
pub fn init_production() {
    init(production_config());
}

fn production_config() -> LogConfig {
    LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    }
}

/// Initialize logging with production settings and a file output
pub fn init_production_with_file(path: &str) -> Result<(), io::Error> {
    init_with_file(production_config(), path)
}

/// Initialize logging for testing
///
/// Only shows warnings and errors by default to keep test output clean.
///
/// ```rust
/// use constellation::logging;
///
/// #[test]
/// fn my_test() {
///     logging::init_test();
///     // Your test code...
/// }
/// ```
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Create a span for everything that happens to one activity
///
/// ```rust
/// use constellation::activity_span;
///
/// let span = activity_span!("AID:0:0:1", "fib");
/// let _guard = span.enter();
///
/// let span = activity_span!("AID:0:0:2", "fib", executor = 3);
/// ```
#[macro_export]
macro_rules! activity_span {
    ($activity_id:expr, $kind:expr) => {
        $crate::logging::tracing::debug_span!("activity", id = %$activity_id, kind = $kind)
    };
    ($activity_id:expr, $kind:expr, $($fields:tt)*) => {
        $crate::logging::tracing::debug_span!("activity", id = %$activity_id, kind = $kind, $($fields)*)
    };
}

/// Log activity lifecycle events: submitted, started, stolen, finished
///
/// ```rust
/// use constellation::log_lifecycle;
///
/// log_lifecycle!("AID:0:0:1", "fib", "submitted");
/// log_lifecycle!("AID:0:0:1", "fib", "stolen", thief = 2);
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($activity_id:expr, $kind:expr, $event:expr) => {
        $crate::logging::tracing::debug!(activity = %$activity_id, kind = $kind, event = $event)
    };
    ($activity_id:expr, $kind:expr, $event:expr, $($fields:tt)*) => {
        $crate::logging::tracing::debug!(activity = %$activity_id, kind = $kind, event = $event, $($fields)*)
    };
}

/// Log work-stealing events
///
/// ```rust
/// use constellation::log_steal;
///
/// log_steal!("local", "hit");
/// log_steal!("remote", "reply_received", records = 4);
/// ```
#[macro_export]
macro_rules! log_steal {
    ($level:expr, $event:expr) => {
        $crate::logging::tracing::trace!(steal = $level, event = $event)
    };
    ($level:expr, $event:expr, $($fields:tt)*) => {
        $crate::logging::tracing::trace!(steal = $level, event = $event, $($fields)*)
    };
}

/// Log pool coordination events: elections, membership, activation
///
/// ```rust
/// use constellation::log_pool;
///
/// log_pool!("render", "elected_master");
/// log_pool!("render", "member_added", rank = 3, timestamp = 4);
/// ```
#[macro_export]
macro_rules! log_pool {
    ($pool:expr, $event:expr) => {
        $crate::logging::tracing::info!(pool = %$pool, event = $event)
    };
    ($pool:expr, $event:expr, $($fields:tt)*) => {
        $crate::logging::tracing::info!(pool = %$pool, event = $event, $($fields)*)
    };
}

/// Log error events - use for all error conditions
///
/// ```rust
/// use constellation::log_error;
///
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "peer gone");
/// log_error!(error);
/// log_error!(error, component = "coordinator", operation = "send");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        $crate::logging::tracing::error!(error = %$error)
    };
    ($error:expr, $($fields:tt)*) => {
        $crate::logging::tracing::error!(error = %$error, $($fields)*)
    };
}

/// Get the current tracing dispatcher, for threads spawned outside the
/// runtime that should log with the same configuration
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

// Re-export the most commonly used tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
