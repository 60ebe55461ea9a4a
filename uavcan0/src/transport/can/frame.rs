//! `Frame`: a view over a 29-bit CAN identifier plus up to 8 payload bytes,
//! per §4.4. Anonymous frames (source_node_id == 0) report `transfer_id = 0`,
//! `frame_index = 0`, `last_frame = true` regardless of the bits actually on
//! the wire.

use arrayvec::ArrayVec;
use embedded_can::ExtendedId;
use num_traits::ToPrimitive;

use super::bitfields::FrameId;
use crate::time::Timestamp;
use crate::types::{NodeId, PortId, TransferId, TransferPriority};
use crate::{RxError, TxError};

/// Routing key for a transfer, per §4.4: `(src, dtid, tid, priority)` for
/// broadcast, `(src, dest, dtid, tid, priority)` otherwise, unified here with
/// `dest_node_id: None` standing in for the broadcast case.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransferKey {
    pub source_node_id: NodeId,
    pub dest_node_id: Option<NodeId>,
    pub data_type_id: PortId,
    pub transfer_id: TransferId,
    pub transfer_priority: u8,
}

#[derive(Clone, Debug)]
pub struct Frame<C: embedded_time::Clock> {
    pub timestamp: Timestamp<C>,
    id: FrameId,
    payload: ArrayVec<[u8; 8]>,
}

impl<C: embedded_time::Clock> Frame<C> {
    /// Decodes a raw extended CAN frame. Non-extended frames must be
    /// filtered out by the caller before reaching this constructor; an
    /// empty payload or one over 8 bytes is rejected here.
    pub fn from_can(timestamp: Timestamp<C>, raw_id: u32, data: &[u8]) -> Result<Self, RxError> {
        if data.is_empty() || data.len() > 8 {
            return Err(RxError::FrameMalformed);
        }
        Ok(Self {
            timestamp,
            id: FrameId::new(raw_id),
            payload: ArrayVec::from_iter(data.iter().copied()),
        })
    }

    /// Builds an outbound frame from transfer-level fields and one payload
    /// chunk (already split to `bytes_per_frame` by `Transfer::to_frames`).
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        timestamp: Timestamp<C>,
        priority: TransferPriority,
        transfer_id: TransferId,
        frame_index: u16,
        last_frame: bool,
        source_node_id: NodeId,
        data_type_id: PortId,
        dest_node_id: Option<NodeId>,
        request_not_response: bool,
        payload_chunk: &[u8],
    ) -> Result<Self, TxError> {
        let anonymous = source_node_id == 0;
        if anonymous && !(frame_index == 0 && last_frame) {
            return Err(TxError::AnonNotSingleFrame);
        }

        let mut id = FrameId::new(0);
        id.set_transfer_priority(priority);
        id.set_transfer_id(transfer_id);
        id.set_last_frame(last_frame);
        id.set_frame_index(frame_index);
        id.set_source_node_id(source_node_id);
        id.set_data_type_id(data_type_id);

        if priority.is_service() {
            if source_node_id == 0 {
                return Err(TxError::ServiceNoSourceId);
            }
            if dest_node_id.is_none() {
                return Err(TxError::ServiceNoDestinationId);
            }
            id.set_request_not_response(request_not_response);
        } else {
            id.set_broadcast_not_unicast(dest_node_id.is_none());
        }

        let mut payload = ArrayVec::new();
        match dest_node_id {
            Some(dest) => {
                if payload_chunk.len() > 7 {
                    return Err(TxError::PayloadTooLarge);
                }
                payload.push(dest & 0x7F);
                payload.extend(payload_chunk.iter().copied());
            }
            None => {
                if payload_chunk.len() > 8 {
                    return Err(TxError::PayloadTooLarge);
                }
                payload.extend(payload_chunk.iter().copied());
            }
        }

        Ok(Self {
            timestamp,
            id,
            payload,
        })
    }

    pub fn extended_id(&self) -> ExtendedId {
        ExtendedId::new(self.id.raw()).expect("id masked to 29 bits by FrameId")
    }

    pub fn raw_id(&self) -> u32 {
        self.id.raw()
    }

    pub fn transfer_priority(&self) -> TransferPriority {
        self.id.transfer_priority()
    }

    pub fn source_node_id(&self) -> NodeId {
        self.id.source_node_id()
    }

    pub fn is_anonymous(&self) -> bool {
        self.source_node_id() == 0
    }

    pub fn transfer_id(&self) -> TransferId {
        if self.is_anonymous() {
            0
        } else {
            self.id.raw_transfer_id()
        }
    }

    pub fn last_frame(&self) -> bool {
        if self.is_anonymous() {
            true
        } else {
            self.id.raw_last_frame()
        }
    }

    pub fn frame_index(&self) -> u16 {
        if self.is_anonymous() {
            0
        } else {
            self.id.raw_frame_index()
        }
    }

    pub fn data_type_id(&self) -> PortId {
        self.id.data_type_id()
    }

    pub fn broadcast_not_unicast(&self) -> bool {
        if self.transfer_priority().is_service() {
            false
        } else {
            self.id.broadcast_not_unicast()
        }
    }

    pub fn request_not_response(&self) -> bool {
        self.transfer_priority().is_service() && self.id.request_not_response()
    }

    pub fn dest_node_id(&self) -> Option<NodeId> {
        if self.broadcast_not_unicast() {
            None
        } else {
            self.payload.first().map(|b| b & 0x7F)
        }
    }

    /// Payload bytes, excluding the destination-node prefix for
    /// unicast/service frames.
    pub fn payload(&self) -> &[u8] {
        if self.broadcast_not_unicast() {
            &self.payload
        } else {
            &self.payload[1.min(self.payload.len())..]
        }
    }

    /// The bytes exactly as they belong in the CAN data field, including the
    /// destination-node prefix byte for unicast/service frames. This is what
    /// a driver's `send(message_id, bytes, extended=true)` call expects, and
    /// what `from_can` expects back on the receive side.
    pub fn wire_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn transfer_key(&self) -> TransferKey {
        TransferKey {
            source_node_id: self.source_node_id(),
            dest_node_id: self.dest_node_id(),
            data_type_id: self.data_type_id(),
            transfer_id: self.transfer_id(),
            transfer_priority: self.transfer_priority().to_u8().unwrap_or(3),
        }
    }
}
