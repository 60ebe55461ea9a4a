//! Splitting a logical message into a CAN frame sequence, and reassembling
//! a received frame sequence back into one, per §4.5.

use alloc::vec::Vec;

use crate::crc::crc16_ccitt;
use crate::time::Timestamp;
use crate::transport::can::Frame;
use crate::types::{DataTypeSignature, NodeId, PortId, TransferId, TransferPriority};
use crate::{RxError, TxError};

pub mod manager;

pub use manager::TransferManager;

/// Which of the three logical transfer categories a completed transfer
/// belongs to -- used to pick the type descriptor to unpack against.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum TransferKind {
    Message,
    Request,
    Response,
}

/// A single logical message or service invocation, independent of how many
/// CAN frames it took to carry it.
#[derive(Clone, Debug)]
pub struct Transfer<C: embedded_time::Clock> {
    pub transfer_id: TransferId,
    pub source_node_id: NodeId,
    pub dest_node_id: Option<NodeId>,
    pub data_type_id: PortId,
    pub transfer_priority: TransferPriority,
    pub request_not_response: bool,
    pub broadcast_not_unicast: bool,
    pub payload: Vec<u8>,
    pub data_type_signature: DataTypeSignature,
    pub timestamp: Timestamp<C>,
}

impl<C: embedded_time::Clock> Transfer<C> {
    pub fn kind(&self) -> TransferKind {
        if !self.transfer_priority.is_service() {
            TransferKind::Message
        } else if self.request_not_response {
            TransferKind::Request
        } else {
            TransferKind::Response
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self.kind(), TransferKind::Message)
    }

    pub fn is_service(&self) -> bool {
        !self.is_message()
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind(), TransferKind::Request)
    }

    pub fn is_response(&self) -> bool {
        matches!(self.kind(), TransferKind::Response)
    }

    pub fn is_broadcast(&self) -> bool {
        self.is_message() && self.broadcast_not_unicast
    }

    pub fn is_unicast(&self) -> bool {
        self.is_message() && !self.broadcast_not_unicast
    }

    /// A response matches a request iff source/dest are swapped and the
    /// data-type id agrees; transfer-id matching is not part of UAVCAN v0
    /// response correlation (§4.7).
    pub fn is_response_to(&self, request: &Transfer<C>) -> bool {
        self.is_response()
            && request.is_request()
            && Some(self.source_node_id) == request.dest_node_id
            && self.dest_node_id == Some(request.source_node_id)
            && self.data_type_id == request.data_type_id
    }

    /// Splits this transfer into a sequence of outbound frames, prepending
    /// a little-endian transfer CRC (seeded with the low 16 bits of
    /// `data_type_signature`) when the payload doesn't fit a single frame.
    pub fn to_frames(&self) -> Result<Vec<Frame<C>>, TxError> {
        let bytes_per_frame = if self.broadcast_not_unicast { 8 } else { 7 };

        let mut staged = Vec::new();
        if self.payload.len() > bytes_per_frame {
            let seed = (self.data_type_signature & 0xFFFF) as u16;
            let crc = crc16_ccitt(&self.payload, seed);
            staged.push((crc & 0xFF) as u8);
            staged.push((crc >> 8) as u8);
        }
        staged.extend_from_slice(&self.payload);

        // `chunks()` on an empty slice yields nothing, but a zero-byte
        // payload (e.g. a service request with no fields) still needs
        // exactly one frame -- so size the loop off a chunk count that's
        // never less than 1.
        let chunk_count = if staged.is_empty() {
            1
        } else {
            staged.len().div_ceil(bytes_per_frame)
        };
        let mut frames = Vec::with_capacity(chunk_count);
        for index in 0..chunk_count {
            let start = index * bytes_per_frame;
            let end = (start + bytes_per_frame).min(staged.len());
            let chunk = &staged[start..end];
            let last = index + 1 == chunk_count;
            frames.push(Frame::build(
                self.timestamp,
                self.transfer_priority,
                self.transfer_id,
                index as u16,
                last,
                self.source_node_id,
                self.data_type_id,
                self.dest_node_id,
                self.request_not_response,
                chunk,
            )?);
        }
        Ok(frames)
    }

    /// Reassembles a completed, ordered frame list back into a `Transfer`.
    /// `frames` must already be in `frame_index` order (the `TransferManager`
    /// guarantees this by construction); this only validates it.
    pub fn from_frames(
        frames: &[Frame<C>],
        data_type_signature: DataTypeSignature,
    ) -> Result<Self, RxError> {
        let first = frames.first().ok_or(RxError::TransferMalformed)?;

        for (index, frame) in frames.iter().enumerate() {
            if !frame.is_anonymous() && frame.frame_index() as usize != index {
                return Err(RxError::TransferMalformed);
            }
        }

        let mut payload = Vec::new();
        for frame in frames {
            payload.extend_from_slice(frame.payload());
        }

        if frames.len() > 1 {
            if payload.len() < 2 {
                return Err(RxError::TransferMalformed);
            }
            let carried_crc = u16::from(payload[0]) | (u16::from(payload[1]) << 8);
            payload.drain(0..2);
            let seed = (data_type_signature & 0xFFFF) as u16;
            if crc16_ccitt(&payload, seed) != carried_crc {
                return Err(RxError::CrcMismatch);
            }
        }

        Ok(Transfer {
            transfer_id: first.transfer_id(),
            source_node_id: first.source_node_id(),
            dest_node_id: first.dest_node_id(),
            data_type_id: first.data_type_id(),
            transfer_priority: first.transfer_priority(),
            request_not_response: first.request_not_response(),
            broadcast_not_unicast: first.broadcast_not_unicast(),
            payload,
            data_type_signature,
            timestamp: first.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_instant::Instant as MockInstantRaw;

    #[derive(Debug, Clone)]
    struct MockClock;
    impl embedded_time::Clock for MockClock {
        type T = u32;
        const SCALING_FACTOR: embedded_time::fraction::Fraction =
            embedded_time::fraction::Fraction::new(1, 1000);
        fn try_now(&self) -> Result<Timestamp<Self>, embedded_time::clock::Error> {
            Ok(Timestamp::new(MockInstantRaw::now().elapsed().as_millis() as u32))
        }
    }

    fn transfer(payload: Vec<u8>, broadcast: bool) -> Transfer<MockClock> {
        Transfer {
            transfer_id: 3,
            source_node_id: 42,
            dest_node_id: if broadcast { None } else { Some(7) },
            data_type_id: 20,
            transfer_priority: TransferPriority::Normal,
            request_not_response: false,
            broadcast_not_unicast: broadcast,
            payload,
            data_type_signature: 0xDEAD_BEEF_1234_5678,
            timestamp: Timestamp::new(0),
        }
    }

    #[test]
    fn single_frame_round_trip() {
        let t = transfer(alloc::vec![1, 2, 3], true);
        let frames = t.to_frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].last_frame());

        let back = Transfer::from_frames(&frames, t.data_type_signature).unwrap();
        assert_eq!(back.payload, t.payload);
        assert_eq!(back.source_node_id, t.source_node_id);
    }

    #[test]
    fn multi_frame_round_trip_with_crc() {
        let payload: Vec<u8> = (0..20u8).collect();
        let t = transfer(payload.clone(), true);
        let frames = t.to_frames().unwrap();
        assert!(frames.len() > 1);
        assert!(frames.last().unwrap().last_frame());

        let back = Transfer::from_frames(&frames, t.data_type_signature).unwrap();
        assert_eq!(back.payload, payload);
    }

    #[test]
    fn multi_frame_crc_mismatch_is_detected() {
        let payload: Vec<u8> = (0..20u8).collect();
        let t = transfer(payload, true);
        let mut frames = t.to_frames().unwrap();

        // Flip a payload byte in a middle frame -- corrupts the CRC check.
        let mid = frames.len() / 2;
        let corrupted = {
            let mut bytes = frames[mid].payload().to_vec();
            bytes[0] ^= 0xFF;
            Frame::build(
                frames[mid].timestamp,
                frames[mid].transfer_priority(),
                frames[mid].transfer_id(),
                frames[mid].frame_index(),
                frames[mid].last_frame(),
                frames[mid].source_node_id(),
                frames[mid].data_type_id(),
                frames[mid].dest_node_id(),
                frames[mid].request_not_response(),
                &bytes,
            )
            .unwrap()
        };
        frames[mid] = corrupted;

        let err = Transfer::from_frames(&frames, t.data_type_signature).unwrap_err();
        assert!(matches!(err, RxError::CrcMismatch));
    }

    #[test]
    fn frame_index_gap_is_malformed() {
        let payload: Vec<u8> = (0..20u8).collect();
        let t = transfer(payload, true);
        let mut frames = t.to_frames().unwrap();
        frames.remove(1);

        let err = Transfer::from_frames(&frames, t.data_type_signature).unwrap_err();
        assert!(matches!(err, RxError::TransferMalformed));
    }

    #[test]
    fn unicast_reserves_one_byte_for_destination() {
        let t = transfer(alloc::vec![0u8; 7], false);
        let frames = t.to_frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].dest_node_id(), Some(7));
    }
}
