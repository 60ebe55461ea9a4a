//! Shared fixtures for the integration tests: a fake clock and two small
//! hand-built type descriptors (`NodeStatus`, `GetNodeInfo`) standing in for
//! what a real DSDL parser would hand the node core.

use std::rc::Rc;

use uavcan0::dsdl::{
    ArrayDescriptor, ArrayMode, CastMode, CompoundDescriptor, CompoundKind, Field,
    PrimitiveDescriptor, TypeDescriptor,
};
use uavcan0::time::Timestamp;

pub const NODE_STATUS_DTID: u16 = 341;
pub const NODE_STATUS_SIGNATURE: u64 = 0x0f0868d0_c1a7c6f1;

pub const GET_NODE_INFO_DTID: u16 = 1;
pub const GET_NODE_INFO_SIGNATURE: u64 = 0xee468a8121c46a9e;

#[derive(Debug, Clone)]
pub struct MockClock;

impl embedded_time::Clock for MockClock {
    type T = u32;
    const SCALING_FACTOR: embedded_time::fraction::Fraction =
        embedded_time::fraction::Fraction::new(1, 1000);

    fn try_now(&self) -> Result<Timestamp<Self>, embedded_time::clock::Error> {
        Ok(Timestamp::new(0))
    }
}

pub fn ts(ms: u32) -> Timestamp<MockClock> {
    Timestamp::new(ms)
}

fn uint8() -> Rc<TypeDescriptor> {
    Rc::new(TypeDescriptor::Primitive(PrimitiveDescriptor::unsigned(
        8,
        CastMode::Saturated,
    )))
}

/// `uint32 uptime_sec`, `uint2 health`, `uint3 mode`, `uint3 sub_mode`,
/// `uint16 vendor_specific_status_code` -- 56 bits, 7 bytes, matching
/// the end-to-end scenario's expected single-frame payload length.
pub fn node_status_descriptor() -> Rc<TypeDescriptor> {
    let fields = vec![
        Field::new(
            "uptime_sec",
            Rc::new(TypeDescriptor::Primitive(PrimitiveDescriptor::unsigned(
                32,
                CastMode::Saturated,
            ))),
        ),
        Field::new(
            "health",
            Rc::new(TypeDescriptor::Primitive(PrimitiveDescriptor::unsigned(
                2,
                CastMode::Saturated,
            ))),
        ),
        Field::new(
            "mode",
            Rc::new(TypeDescriptor::Primitive(PrimitiveDescriptor::unsigned(
                3,
                CastMode::Saturated,
            ))),
        ),
        Field::new(
            "sub_mode",
            Rc::new(TypeDescriptor::Primitive(PrimitiveDescriptor::unsigned(
                3,
                CastMode::Saturated,
            ))),
        ),
        Field::new(
            "vendor_specific_status_code",
            Rc::new(TypeDescriptor::Primitive(PrimitiveDescriptor::unsigned(
                16,
                CastMode::Saturated,
            ))),
        ),
    ];

    Rc::new(TypeDescriptor::Compound(CompoundDescriptor {
        default_dtid: NODE_STATUS_DTID,
        data_type_signature: NODE_STATUS_SIGNATURE,
        kind_sub: CompoundKind::Message,
        fields,
        constants: vec![],
        request_fields: vec![],
        request_constants: vec![],
        response_fields: vec![],
        response_constants: vec![],
    }))
}

/// Request side is empty. Response side carries four version bytes, a
/// 16-byte static unique-id array, and a trailing `uint8[<=80]` name --
/// eligible for TAO since it's the last field and its elements are
/// byte-wide.
pub fn get_node_info_descriptor() -> Rc<TypeDescriptor> {
    let response_fields = vec![
        Field::new("software_version_major", uint8()),
        Field::new("software_version_minor", uint8()),
        Field::new("hardware_version_major", uint8()),
        Field::new("hardware_version_minor", uint8()),
        Field::new(
            "unique_id",
            Rc::new(TypeDescriptor::Array(ArrayDescriptor {
                value_type: uint8(),
                mode: ArrayMode::Static,
                max_size: 16,
            })),
        ),
        Field::new(
            "name",
            Rc::new(TypeDescriptor::Array(ArrayDescriptor {
                value_type: uint8(),
                mode: ArrayMode::Dynamic,
                max_size: 80,
            })),
        ),
    ];

    Rc::new(TypeDescriptor::Compound(CompoundDescriptor {
        default_dtid: GET_NODE_INFO_DTID,
        data_type_signature: GET_NODE_INFO_SIGNATURE,
        kind_sub: CompoundKind::Service,
        fields: vec![],
        constants: vec![],
        request_fields: vec![],
        request_constants: vec![],
        response_fields,
        response_constants: vec![],
    }))
}
