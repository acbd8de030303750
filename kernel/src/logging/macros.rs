//! Logging macros
//!
//! - `log_error!` - Hardware-contract violations, engine faults
//! - `log_warn!` - Conditions the owning subsystem should investigate
//! - `log_info!` - Ring lifecycle milestones
//! - `log_debug!` - Ring state transitions
//! - `log_trace!` - Per-descriptor traffic
//!
//! All macros capture the module path, file and line of the call site and
//! hand an unformatted `fmt::Arguments` to [`crate::logging::log_impl`], so a
//! filtered-out message costs one table lookup and no formatting.

/// Log an ERROR level message
///
/// ```rust,ignore
/// log_error!("transfer event references {:#x} outside ring memory", ptr);
/// ```
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_impl(
            $crate::logging::LogLevel::Error,
            module_path!(),
            file!(),
            line!(),
            format_args!($($arg)*),
        )
    };
}

/// Log a WARN level message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_impl(
            $crate::logging::LogLevel::Warn,
            module_path!(),
            file!(),
            line!(),
            format_args!($($arg)*),
        )
    };
}

/// Log an INFO level message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_impl(
            $crate::logging::LogLevel::Info,
            module_path!(),
            file!(),
            line!(),
            format_args!($($arg)*),
        )
    };
}

/// Log a DEBUG level message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_impl(
            $crate::logging::LogLevel::Debug,
            module_path!(),
            file!(),
            line!(),
            format_args!($($arg)*),
        )
    };
}

/// Log a TRACE level message
///
/// Used on the enqueue/drain hot paths; keep arguments cheap.
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log_impl(
            $crate::logging::LogLevel::Trace,
            module_path!(),
            file!(),
            line!(),
            format_args!($($arg)*),
        )
    };
}
