//! Transport-specific functionality.
//!
//! UAVCAN v0 is a CAN-only protocol (no heterogeneous-transport story), so
//! this module holds a single concrete implementation rather than a generic
//! `Transport` trait over a family of backends.

pub mod can;
