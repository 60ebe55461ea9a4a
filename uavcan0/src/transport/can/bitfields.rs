//! Bit-field access over the 29-bit CAN identifier, per §4.4. The layout
//! branches on `transfer_priority`: SERVICE priority frames use a distinct
//! field arrangement from message (broadcast/unicast) frames. Expressed here
//! as two `bitfield!`-generated structs, `CanMessageId` and `CanServiceId`,
//! exactly as the original's two ID types are picked by checking the
//! priority field before decoding the rest.

use bitfield::bitfield;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::types::TransferPriority;

bitfield! {
    /// Raw field layout for broadcast/unicast message frames.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct CanMessageId(u32);
    impl Debug;
    u8;
    pub raw_priority, set_raw_priority: 28, 27;
    pub raw_source_node_id, set_raw_source_node_id: 15, 9;
    pub broadcast_not_unicast, set_broadcast_not_unicast: 8;
    pub raw_transfer_id, set_raw_transfer_id: 2, 0;
    pub last_frame, set_last_frame: 3;
    pub raw_frame_index, set_raw_frame_index: 7, 4;
    u16;
    pub raw_data_type_id, set_raw_data_type_id: 26, 16;
}

bitfield! {
    /// Raw field layout for SERVICE (request/response) frames.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct CanServiceId(u32);
    impl Debug;
    u8;
    pub raw_priority, set_raw_priority: 28, 27;
    pub request_not_response, set_request_not_response: 26;
    pub raw_source_node_id, set_raw_source_node_id: 16, 10;
    pub raw_transfer_id, set_raw_transfer_id: 2, 0;
    pub last_frame, set_last_frame: 3;
    pub raw_frame_index, set_raw_frame_index: 9, 4;
    u16;
    pub raw_data_type_id, set_raw_data_type_id: 25, 17;
}

/// A 29-bit CAN identifier, decoded per the frame-kind-dependent layout in
/// §4.4 by dispatching to `CanMessageId`/`CanServiceId` on the priority
/// field. Anonymous-frame overrides (`transfer_id`/`frame_index`/
/// `last_frame`) are NOT applied here -- callers consult `Frame` for that,
/// since this type only knows about the raw bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameId(pub u32);

impl FrameId {
    pub const MASK: u32 = 0x1FFF_FFFF;

    pub fn new(raw: u32) -> Self {
        Self(raw & Self::MASK)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn transfer_priority(self) -> TransferPriority {
        TransferPriority::from_u8(CanMessageId(self.0).raw_priority()).unwrap_or(TransferPriority::Low)
    }

    pub fn set_transfer_priority(&mut self, priority: TransferPriority) {
        let mut id = CanMessageId(self.0);
        id.set_raw_priority(priority.to_u8().unwrap());
        self.0 = id.0;
    }

    pub fn raw_transfer_id(self) -> u8 {
        if self.transfer_priority().is_service() {
            CanServiceId(self.0).raw_transfer_id()
        } else {
            CanMessageId(self.0).raw_transfer_id()
        }
    }

    pub fn set_transfer_id(&mut self, value: u8) {
        if self.transfer_priority().is_service() {
            let mut id = CanServiceId(self.0);
            id.set_raw_transfer_id(value);
            self.0 = id.0;
        } else {
            let mut id = CanMessageId(self.0);
            id.set_raw_transfer_id(value);
            self.0 = id.0;
        }
    }

    pub fn raw_last_frame(self) -> bool {
        if self.transfer_priority().is_service() {
            CanServiceId(self.0).last_frame()
        } else {
            CanMessageId(self.0).last_frame()
        }
    }

    pub fn set_last_frame(&mut self, value: bool) {
        if self.transfer_priority().is_service() {
            let mut id = CanServiceId(self.0);
            id.set_last_frame(value);
            self.0 = id.0;
        } else {
            let mut id = CanMessageId(self.0);
            id.set_last_frame(value);
            self.0 = id.0;
        }
    }

    pub fn raw_frame_index(self) -> u16 {
        if self.transfer_priority().is_service() {
            CanServiceId(self.0).raw_frame_index() as u16
        } else {
            CanMessageId(self.0).raw_frame_index() as u16
        }
    }

    pub fn set_frame_index(&mut self, value: u16) {
        if self.transfer_priority().is_service() {
            let mut id = CanServiceId(self.0);
            id.set_raw_frame_index(value as u8);
            self.0 = id.0;
        } else {
            let mut id = CanMessageId(self.0);
            id.set_raw_frame_index(value as u8);
            self.0 = id.0;
        }
    }

    pub fn broadcast_not_unicast(self) -> bool {
        CanMessageId(self.0).broadcast_not_unicast()
    }

    pub fn set_broadcast_not_unicast(&mut self, value: bool) {
        let mut id = CanMessageId(self.0);
        id.set_broadcast_not_unicast(value);
        self.0 = id.0;
    }

    pub fn request_not_response(self) -> bool {
        CanServiceId(self.0).request_not_response()
    }

    pub fn set_request_not_response(&mut self, value: bool) {
        let mut id = CanServiceId(self.0);
        id.set_request_not_response(value);
        self.0 = id.0;
    }

    pub fn source_node_id(self) -> u8 {
        if self.transfer_priority().is_service() {
            CanServiceId(self.0).raw_source_node_id()
        } else {
            CanMessageId(self.0).raw_source_node_id()
        }
    }

    pub fn set_source_node_id(&mut self, value: u8) {
        if self.transfer_priority().is_service() {
            let mut id = CanServiceId(self.0);
            id.set_raw_source_node_id(value);
            self.0 = id.0;
        } else {
            let mut id = CanMessageId(self.0);
            id.set_raw_source_node_id(value);
            self.0 = id.0;
        }
    }

    pub fn data_type_id(self) -> u16 {
        if self.transfer_priority().is_service() {
            CanServiceId(self.0).raw_data_type_id()
        } else {
            CanMessageId(self.0).raw_data_type_id()
        }
    }

    pub fn set_data_type_id(&mut self, value: u16) {
        if self.transfer_priority().is_service() {
            let mut id = CanServiceId(self.0);
            id.set_raw_data_type_id(value);
            self.0 = id.0;
        } else {
            let mut id = CanMessageId(self.0);
            id.set_raw_data_type_id(value);
            self.0 = id.0;
        }
    }
}
