//! UAVCAN v0 CAN transport: the 29-bit identifier bit-field view and the
//! `Frame` built on top of it.

mod bitfields;
mod frame;

pub use bitfields::FrameId;
pub use frame::{Frame, TransferKey};
