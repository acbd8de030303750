//! Unified logging subsystem
//!
//! The ring engine logs through the same macro family the rest of the kernel
//! uses:
//! - **Log Levels**: ERROR, WARN, INFO, DEBUG, TRACE
//! - **Per-Module Filtering**: module-path prefixes carry their own level
//! - **Runtime Configuration**: levels can be changed while the driver runs
//! - **Pluggable Sink**: records are handed to the `log` facade, so whichever
//!   `log::Log` implementation the embedding kernel installed decides where
//!   bytes go (QEMU debug port, serial, a test capture buffer...)
//! - **Allocation-Free**: formatting is deferred to the sink via `fmt::Arguments`
//!
//! ## Usage
//!
//! ```rust,ignore
//! log_info!("event ring {} ready", interrupter);
//! log_debug!("ring advance crossed link at {:#x}", phys);
//! log_error!("transfer event for unknown TRB {:#x}", ptr);
//! ```

mod filter;

// Macros must be declared before they're used
#[macro_use]
pub mod macros;

pub use filter::{get_module_level, set_default_level, set_module_level, ModuleFilter};

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

/// Log levels (ordered from most to least severe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Hardware-contract violations and unrecoverable engine states
    Error = 0,
    /// Conditions the owning subsystem should look at
    Warn = 1,
    /// Ring lifecycle milestones
    Info = 2,
    /// Ring state transitions
    Debug = 3,
    /// Per-descriptor traffic
    Trace = 4,
}

impl LogLevel {
    /// Convert log level to string prefix
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN ",
            LogLevel::Info => "INFO ",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Parse a level name, accepting short aliases.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let matches = |names: &[&str]| names.iter().any(|n| n.eq_ignore_ascii_case(s));
        if matches(&["ERROR", "ERR", "E"]) {
            Some(LogLevel::Error)
        } else if matches(&["WARN", "WARNING", "W"]) {
            Some(LogLevel::Warn)
        } else if matches(&["INFO", "I"]) {
            Some(LogLevel::Info)
        } else if matches(&["DEBUG", "DBG", "D"]) {
            Some(LogLevel::Debug)
        } else if matches(&["TRACE", "TRC", "T"]) {
            Some(LogLevel::Trace)
        } else {
            None
        }
    }

    /// Matching level of the `log` facade.
    pub const fn to_log(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }

    pub(crate) const fn from_u8(val: u8) -> Self {
        match val {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            4 => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logging system initialization state
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the logging subsystem
///
/// Loads default filters from `config.rs`. Safe to call multiple times
/// (idempotent); the controller calls it on construction.
pub fn init() {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    filter::init_default_filters();
}

/// Log a message (internal function used by macros)
///
/// Performs per-module filtering and forwards the record to the `log`
/// facade with the captured source location.
#[doc(hidden)]
pub fn log_impl(level: LogLevel, module: &str, file: &str, line: u32, args: fmt::Arguments<'_>) {
    if !filter::should_log(module, level) {
        return;
    }

    let logger = log::logger();
    let record = log::Record::builder()
        .level(level.to_log())
        .target(short_module(module))
        .module_path(Some(module))
        .file(Some(file))
        .line(Some(line))
        .args(args)
        .build();
    if logger.enabled(record.metadata()) {
        logger.log(&record);
    }
}

/// Strip the crate name so targets stay short:
/// "theseus_xhci::drivers::usb::xhci::rings" -> "drivers::usb::xhci::rings"
fn short_module(module: &str) -> &str {
    match module.find("::") {
        Some(idx) => &module[idx + 2..],
        None => module,
    }
}
