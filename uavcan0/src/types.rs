//! Small newtypes shared across the crate.

/// Node identity, 0..=127. 0 means anonymous.
pub type NodeId = u8;

/// Data-type ID. 11 bits for messages, 9 bits for services.
pub type PortId = u16;

/// 3-bit transfer identifier, wraps modulo 8.
pub type TransferId = u8;

/// 64-bit DSDL data-type signature. The low 16 bits seed the transfer CRC.
pub type DataTypeSignature = u64;

pub(crate) const MAX_NODE_ID: u8 = 127;

/// Clamp a raw node id to the 7 bits the wire format allows.
pub(crate) const fn mask_node_id(id: u8) -> u8 {
    id & 0x7F
}

/// Transfer priority, encoded in the 2-bit `transfer_priority` ID field.
/// Ordinal values are authoritative per the original implementation's
/// `TransferPriority` class: HIGH=0, NORMAL=1, SERVICE=2, LOW=3. SERVICE also
/// selects the service-frame ID layout in §4.4.
#[derive(FromPrimitive, ToPrimitive, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum TransferPriority {
    High = 0,
    Normal = 1,
    Service = 2,
    Low = 3,
}

impl TransferPriority {
    pub fn is_service(self) -> bool {
        matches!(self, TransferPriority::Service)
    }
}
