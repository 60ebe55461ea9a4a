//! # UAVCAN v0 node core
//!
//! A protocol engine for UAVCAN v0: the runtime-typed DSDL value model, the
//! CAN frame/transfer codec, and the transfer-reassembly + dispatch state
//! machine that a node runs on top of a CAN driver. The DSDL parser that
//! turns `.uavcan` source into type descriptors, the CAN driver itself, and
//! event-loop/timer integration are all out of scope and expected to be
//! supplied by the embedder.
#![no_std]
//#![deny(warnings)]

#[allow(unused_imports)]
#[cfg(feature = "std")]
#[macro_use]
extern crate std;

#[macro_use]
extern crate num_derive;

extern crate alloc;

pub mod bits;
pub mod crc;
pub mod dsdl;
pub mod handler;
pub mod time;
pub mod transfer;
pub mod transport;
pub mod types;

mod node;

pub use dsdl::DsdlError;
pub use node::Node;
pub use transfer::{Transfer, TransferManager};
pub use transport::can::{Frame, FrameId, TransferKey};
pub use types::{DataTypeSignature, NodeId, PortId, TransferId, TransferPriority};

/// Protocol-layer errors from receiving and reassembling inbound frames.
/// Per the error-handling policy, every one of these is locally recovered:
/// the offending frame or transfer is dropped and the caller continues.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// Non-extended frame, malformed ID, or a payload outside 1..=8 bytes.
    FrameMalformed,
    /// `frame_index` gap or mismatch discovered while reassembling.
    TransferMalformed,
    /// The recomputed CRC over a multi-frame payload didn't match the
    /// prepended one.
    CrcMismatch,
    /// Completed transfer for a data-type id with no registered handler.
    UnknownDtid,
}

/// Errors from constructing an outbound frame or transfer. These stem from
/// caller-supplied parameters, not from anything received over the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// Anonymous frames (source_node_id == 0) must be single-frame.
    AnonNotSingleFrame,
    /// A SERVICE-priority frame needs a non-anonymous source.
    ServiceNoSourceId,
    /// A SERVICE-priority frame needs a destination node id.
    ServiceNoDestinationId,
    /// Payload chunk exceeds `bytes_per_frame` for this frame's layout.
    PayloadTooLarge,
}
