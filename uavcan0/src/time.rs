//! Generic timekeeping, built on `embedded_time` so the core stays portable
//! across whatever clock source the embedding application provides.

pub use embedded_time::Instant as Timestamp;

/// Duration type used throughout the crate for timeouts (reassembly,
/// heartbeat period). Milliseconds are plenty of resolution for a CAN bus
/// and keep the counter comfortably inside a `u32`.
pub type Duration = embedded_time::duration::Milliseconds<u32>;
