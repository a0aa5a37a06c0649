//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! The transfer path logs every skipped record and stall; modules that
//! get chatty at one event per minute define the flag and use these so
//! the noise can be switched off in one place:
//!
//! ```rust
//! const ENABLE_LOGS: bool = true;
//!
//! use minute_export::{log_error, log_info, log_warn};
//!
//! log_info!("logged only when ENABLE_LOGS is true");
//! ```

/// Macro for conditional info logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Macro for conditional warn logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Macro for conditional error logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
