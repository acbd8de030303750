//! Per-module log level filtering
//!
//! Levels are attached to module-path prefixes. A message from
//! `theseus_xhci::drivers::usb::xhci::rings` is checked against that full path
//! first, then `theseus_xhci::drivers::usb::xhci`, and so on up to the crate
//! root; the first configured prefix decides. Unconfigured paths fall back to
//! the default level.
//!
//! The table is a fixed array of atomics. Each entry packs an FNV-1a hash of
//! the prefix, the prefix length and the level into one `u64`, so a reader
//! sees either an empty slot or a complete entry, and lookups never allocate
//! or lock and are safe from interrupt context. Two distinct prefixes of the
//! same length whose hashes collide share an entry.

use super::LogLevel;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Number of prefix slots (power of 2 for fast modulo)
const FILTER_SLOTS: usize = 64;

/// Bits of a packed entry that identify the prefix (hash and length).
const KEY_MASK: u64 = !0xFF;

/// Packed entries: hash << 32 | length << 8 | level. Zero marks an empty slot.
static MODULE_FILTERS: [AtomicU64; FILTER_SLOTS] = {
    const EMPTY: AtomicU64 = AtomicU64::new(0);
    [EMPTY; FILTER_SLOTS]
};

static DEFAULT_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Key half of an entry for `prefix`; never zero.
fn entry_key(prefix: &str) -> u64 {
    ((hash_prefix(prefix) as u64) << 32) | (((prefix.len() & 0xFF_FFFF) as u64) << 8)
}

/// Module filter manager
pub struct ModuleFilter;

impl ModuleFilter {
    /// Effective level for a module path (longest configured prefix wins).
    pub fn get(module: &str) -> LogLevel {
        let mut candidate = module;
        loop {
            if let Some(level) = Self::lookup(candidate) {
                return level;
            }
            match candidate.rfind("::") {
                Some(idx) => candidate = &candidate[..idx],
                None => break,
            }
        }
        LogLevel::from_u8(DEFAULT_LEVEL.load(Ordering::Relaxed))
    }

    /// Level configured for exactly this prefix, if any.
    fn lookup(prefix: &str) -> Option<LogLevel> {
        let key = entry_key(prefix);
        let idx = (key >> 32) as usize % FILTER_SLOTS;
        for i in 0..FILTER_SLOTS {
            match MODULE_FILTERS[(idx + i) % FILTER_SLOTS].load(Ordering::Acquire) {
                0 => return None,
                entry if entry & KEY_MASK == key => {
                    return Some(LogLevel::from_u8(entry as u8));
                }
                _ => {}
            }
        }
        None
    }

    /// Set the level for a module prefix. Returns `false` if the table is full.
    pub fn set(prefix: &str, level: LogLevel) -> bool {
        let key = entry_key(prefix);
        let packed = key | level as u64;
        let idx = (key >> 32) as usize % FILTER_SLOTS;
        for i in 0..FILTER_SLOTS {
            let slot = &MODULE_FILTERS[(idx + i) % FILTER_SLOTS];
            match slot.compare_exchange(0, packed, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(existing) if existing & KEY_MASK == key => {
                    slot.store(packed, Ordering::Release);
                    return true;
                }
                Err(_) => {}
            }
        }
        false
    }
}

/// Check if a message at `level` from `module` should reach the sink.
pub fn should_log(module: &str, level: LogLevel) -> bool {
    level <= ModuleFilter::get(module)
}

/// Set log level for a module prefix (e.g. "theseus_xhci::memory").
pub fn set_module_level(prefix: &str, level: LogLevel) -> bool {
    ModuleFilter::set(prefix, level)
}

/// Effective log level for a module path.
pub fn get_module_level(module: &str) -> LogLevel {
    ModuleFilter::get(module)
}

/// Level used when no prefix of a module path is configured.
pub fn set_default_level(level: LogLevel) {
    DEFAULT_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Initialize default log levels from config
pub(super) fn init_default_filters() {
    use crate::config;

    set_default_level(config::DEFAULT_LOG_LEVEL);
    for (prefix, level) in config::MODULE_LOG_LEVELS {
        ModuleFilter::set(prefix, *level);
    }
}

/// FNV-1a; never returns 0, which marks an empty slot.
fn hash_prefix(s: &str) -> u32 {
    const FNV_PRIME: u32 = 16777619;
    const FNV_OFFSET: u32 = 2166136261;

    let mut hash = FNV_OFFSET;
    for byte in s.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    if hash == 0 {
        1
    } else {
        hash
    }
}
