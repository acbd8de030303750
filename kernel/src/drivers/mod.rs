//! Kernel driver subsystem entry point
//!
//! Only the USB host stack lives in this crate.

pub mod usb;
