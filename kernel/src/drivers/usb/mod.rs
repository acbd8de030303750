//! USB driver subsystem.
//!
//! The xHCI ring engine is the only host controller backend so far.

pub mod xhci;

pub use xhci::{HostCallbacks, XhciController};
