//! Logging and observability
//!
//! Structured logging via `tracing`: a console layer plus an optional
//! rotating JSON file layer.
//!
//! # Example
//!
//! ```no_run
//! use medbridge::config::LoggingConfig;
//! use medbridge::logging::init_logging;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a reconciliation sweep
///
/// ```no_run
/// use medbridge::log_sweep_start;
/// use medbridge::domain::SweepKind;
///
/// log_sweep_start!(SweepKind::All, "cli");
/// ```
#[macro_export]
macro_rules! log_sweep_start {
    ($sweep:expr, $trigger:expr) => {
        tracing::info!(
            sweep = %$sweep,
            trigger = $trigger,
            "Starting reconciliation sweep"
        );
    };
}

/// Log an error with context
///
/// ```no_run
/// use medbridge::log_error_with_context;
/// use medbridge::domain::BridgeError;
///
/// let error = BridgeError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
