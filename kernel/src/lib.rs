//! TheseusOS xHCI ring engine
//!
//! Host-side descriptor rings of the xHCI driver: endpoint transfer rings,
//! interrupter event rings, the cycle-bit ownership protocol between them and
//! the controller, and the slot bookkeeping that routes completions back to
//! requests. Register programming, bus enumeration and interrupt plumbing
//! belong to the embedding kernel, which plugs in through
//! [`memory::dma::DmaAllocator`] and [`drivers::usb::xhci::HostCallbacks`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Macros must be available before the modules that use them
#[macro_use]
pub mod logging;

// Config must come after logging since it references logging types
pub mod config;

pub mod drivers;
pub mod memory;

pub use drivers::usb::xhci::{HostCallbacks, TransferCompletion, XhciController};
pub use memory::dma::{DmaAllocator, DmaContext};
