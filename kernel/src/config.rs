//! xHCI ring engine configuration
//!
//! Centralized configuration for ring geometry and logging defaults. Other
//! modules should import these values from `theseus_xhci::config` to keep
//! configuration in a single place. Values that an embedder may want to tune
//! per controller are mirrored in [`XhciConfig`].

use crate::drivers::usb::xhci::error::{XhciError, XhciResult};

/// Size of one Transfer Request Block in bytes (fixed by the xHCI layout).
pub const TRB_SIZE: usize = 16;

/// Default number of TRB slots per endpoint transfer ring (including the link slot).
pub const TRANSFER_RING_TRBS: usize = 256;

/// Default number of TRB slots per event ring segment.
pub const EVENT_RING_TRBS: usize = 256;

/// Number of Event Ring Segment Table entries per interrupter.
pub const ERST_ARRAY_SIZE: usize = 1;

/// Size of one Event Ring Segment Table entry in bytes.
pub const ERST_ENTRY_SIZE: usize = 16;

/// Bytes of ERST placed after the event TRBs in the same allocation.
pub const ERST_BYTES: usize = ERST_ARRAY_SIZE * ERST_ENTRY_SIZE;

/// Alignment applied to every ring allocation.
pub const RING_ALIGNMENT: usize = 64;

/// Rings must not straddle a 64 KiB boundary.
pub const RING_SEGMENT_BOUNDARY: usize = 64 * 1024;

/// Largest payload a single Normal TRB may describe.
pub const MAX_TRB_TRANSFER_LEN: usize = 64 * 1024;

/// Number of interrupters (and therefore event rings) the engine manages by default.
pub const DEFAULT_INTERRUPTERS: u16 = 1;

/// Upper bound on interrupters supported by the register layout.
pub const MAX_INTERRUPTERS: u16 = 1024;

// ============================================================================
// Logging Configuration
// ============================================================================

use crate::logging::LogLevel;

/// Default log level for modules without specific configuration
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

/// Per-module log level overrides
///
/// Entries match by module-path prefix; the longest matching prefix wins.
/// Format: ("module::path", LogLevel::Level)
pub const MODULE_LOG_LEVELS: &[(&str, LogLevel)] = &[
    ("theseus_xhci::drivers::usb::xhci::rings", LogLevel::Debug),
    // ("theseus_xhci::memory", LogLevel::Trace),
];

// ============================================================================
// Runtime configuration
// ============================================================================

/// Per-controller ring geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XhciConfig {
    /// TRB slots allocated for each endpoint transfer ring (one is the link TRB).
    pub transfer_ring_trbs: usize,
    /// TRB slots allocated for each event ring.
    pub event_ring_trbs: usize,
    /// Number of interrupters whose event rings the controller may own.
    pub interrupters: u16,
}

impl Default for XhciConfig {
    fn default() -> Self {
        Self {
            transfer_ring_trbs: TRANSFER_RING_TRBS,
            event_ring_trbs: EVENT_RING_TRBS,
            interrupters: DEFAULT_INTERRUPTERS,
        }
    }
}

impl XhciConfig {
    /// Check the geometry against the hardware contract.
    pub fn validate(&self) -> XhciResult<()> {
        validate_ring_trbs(self.transfer_ring_trbs, 0)?;
        validate_ring_trbs(self.event_ring_trbs, ERST_BYTES)?;
        if self.interrupters == 0 || self.interrupters > MAX_INTERRUPTERS {
            return Err(XhciError::InvalidInterrupter(self.interrupters));
        }
        Ok(())
    }
}

/// A ring needs room for at least one payload slot plus the reserved slot,
/// and its allocation (`trailer` bytes included) must fit inside a single
/// 64 KiB segment.
pub(crate) fn validate_ring_trbs(trbs: usize, trailer: usize) -> XhciResult<()> {
    let bytes = trbs.checked_mul(TRB_SIZE).and_then(|b| b.checked_add(trailer));
    if trbs < 2 || bytes.map_or(true, |b| b > RING_SEGMENT_BOUNDARY) {
        return Err(XhciError::InvalidRingSize(trbs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(XhciConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_degenerate_rings() {
        let cfg = XhciConfig {
            transfer_ring_trbs: 1,
            ..XhciConfig::default()
        };
        assert_eq!(cfg.validate(), Err(XhciError::InvalidRingSize(1)));

        let cfg = XhciConfig {
            event_ring_trbs: RING_SEGMENT_BOUNDARY / TRB_SIZE + 1,
            ..XhciConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(XhciError::InvalidRingSize(_))));
    }

    #[test]
    fn event_ring_leaves_room_for_erst() {
        let max = RING_SEGMENT_BOUNDARY / TRB_SIZE;
        let cfg = XhciConfig {
            transfer_ring_trbs: max,
            event_ring_trbs: max,
            ..XhciConfig::default()
        };
        assert_eq!(cfg.validate(), Err(XhciError::InvalidRingSize(max)));

        let cfg = XhciConfig {
            event_ring_trbs: max - ERST_BYTES / TRB_SIZE,
            ..cfg
        };
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_interrupters() {
        let cfg = XhciConfig {
            interrupters: 0,
            ..XhciConfig::default()
        };
        assert_eq!(cfg.validate(), Err(XhciError::InvalidInterrupter(0)));
    }
}
