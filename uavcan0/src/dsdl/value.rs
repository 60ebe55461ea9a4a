//! Runtime-typed DSDL value containers. A [`Value`] is built against an
//! immutable [`TypeDescriptor`] and knows how to pack/unpack itself to/from
//! a bit stream following UAVCAN's little-endian-with-TAO rules (§4.3).

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::bits::{self, BitVec};
use crate::dsdl::descriptor::{
    ArrayDescriptor, ArrayMode, CompoundDescriptor, Field, PrimitiveDescriptor, PrimitiveKind,
    ServiceMode, TypeDescriptor,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DsdlError {
    /// Read of a primitive that was never assigned a value.
    UndefinedValue,
    /// Only 16- and 32-bit floats are supported.
    UnsupportedFloatWidth,
    /// Index is past `max_size`, or (for a dynamic array) the stream didn't
    /// have enough bits left to satisfy the declared count.
    IndexOutOfRange,
    /// Constructed a service compound without selecting request/response.
    MissingServiceMode,
    /// Ran out of bits while unpacking.
    InsufficientBits,
}

#[derive(Clone, Debug)]
pub enum Value {
    Primitive(PrimitiveValue),
    Array(ArrayValue),
    Compound(CompoundValue),
}

impl Value {
    pub fn new_default(ty: &Rc<TypeDescriptor>, tao: bool) -> Result<Self, DsdlError> {
        Ok(match &**ty {
            TypeDescriptor::Primitive(p) => Value::Primitive(PrimitiveValue::new(p.clone())),
            TypeDescriptor::Array(a) => Value::Array(ArrayValue::new(ty.clone(), a.clone(), tao)?),
            TypeDescriptor::Compound(c) => {
                let mode = match c.kind_sub {
                    crate::dsdl::descriptor::CompoundKind::Message => None,
                    crate::dsdl::descriptor::CompoundKind::Service => {
                        return Err(DsdlError::MissingServiceMode);
                    }
                };
                Value::Compound(CompoundValue::new(ty.clone(), c.clone(), mode, tao)?)
            }
        })
    }

    /// Builds the request or response side of a service type. Message types
    /// always go through [`Value::new_default`] instead.
    pub fn new_service(
        ty: &Rc<TypeDescriptor>,
        mode: ServiceMode,
        tao: bool,
    ) -> Result<Self, DsdlError> {
        match &**ty {
            TypeDescriptor::Compound(c) => Ok(Value::Compound(CompoundValue::new(
                ty.clone(),
                c.clone(),
                Some(mode),
                tao,
            )?)),
            _ => Err(DsdlError::MissingServiceMode),
        }
    }

    pub fn unpack(&mut self, stream: &mut BitVec) -> Result<(), DsdlError> {
        match self {
            Value::Primitive(v) => v.unpack(stream),
            Value::Array(v) => v.unpack(stream),
            Value::Compound(v) => v.unpack(stream),
        }
    }

    pub fn pack(&self, out: &mut BitVec) {
        match self {
            Value::Primitive(v) => v.pack(out),
            Value::Array(v) => v.pack(out),
            Value::Compound(v) => v.pack(out),
        }
    }

    /// Unpacks from the wire bytes of a transfer payload (MSB-first bytes,
    /// per §4.1).
    pub fn unpack_bytes(&mut self, bytes: &[u8]) -> Result<(), DsdlError> {
        let mut stream = bits::bits_from_bytes(bytes);
        self.unpack(&mut stream)
    }

    /// Packs to the wire bytes of a transfer payload.
    pub fn pack_bytes(&self) -> Vec<u8> {
        let mut out = BitVec::new();
        self.pack(&mut out);
        bits::bytes_from_bits(&out)
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Value::Primitive(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut ArrayValue> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&CompoundValue> {
        match self {
            Value::Compound(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut CompoundValue> {
        match self {
            Value::Compound(v) => Some(v),
            _ => None,
        }
    }
}

/// Holder for a single primitive. Stores the big-endian-reordered bits of
/// `bitlen` width once set; reading before a set raises `UndefinedValue`.
#[derive(Clone, Debug)]
pub struct PrimitiveValue {
    descriptor: PrimitiveDescriptor,
    bits: Option<BitVec>,
}

impl PrimitiveValue {
    pub fn new(descriptor: PrimitiveDescriptor) -> Self {
        Self {
            descriptor,
            bits: None,
        }
    }

    pub fn descriptor(&self) -> &PrimitiveDescriptor {
        &self.descriptor
    }

    pub fn is_set(&self) -> bool {
        self.bits.is_some()
    }

    fn unpack(&mut self, stream: &mut BitVec) -> Result<(), DsdlError> {
        let bitlen = self.descriptor.bitlen as usize;
        if stream.len() < bitlen {
            return Err(DsdlError::InsufficientBits);
        }
        let raw = stream.take(bitlen);
        self.bits = Some(bits::be_from_le_bits(&raw, bitlen));
        Ok(())
    }

    fn pack(&self, out: &mut BitVec) {
        let bitlen = self.descriptor.bitlen as usize;
        match &self.bits {
            Some(b) => out.extend(&bits::le_from_be_bits(b, bitlen)),
            None => {
                for _ in 0..bitlen {
                    out.push(false);
                }
            }
        }
    }

    /// Sets a numeric (bool/int/float) value, applying the descriptor's cast
    /// mode. Booleans are truthy-tested (`value != 0.0`).
    pub fn set_numeric(&mut self, value: f64) -> Result<(), DsdlError> {
        let d = &self.descriptor;
        let raw_bits: u64 = match d.kind {
            PrimitiveKind::Boolean => (value != 0.0) as u64,
            PrimitiveKind::UnsignedInt => {
                let casted = bits::cast(value, d.kind, d.cast_mode, d.bitlen, d.value_range);
                mask_to_bitlen(casted as i64 as u64, d.bitlen)
            }
            PrimitiveKind::SignedInt => {
                let casted = bits::cast(value, d.kind, d.cast_mode, d.bitlen, d.value_range);
                mask_to_bitlen(casted as i64 as u64, d.bitlen)
            }
            PrimitiveKind::Float => {
                let casted = bits::cast(value, d.kind, d.cast_mode, d.bitlen, d.value_range);
                match d.bitlen {
                    16 => bits::f16_from_f32(casted as f32) as u64,
                    32 => (casted as f32).to_bits() as u64,
                    _ => return Err(DsdlError::UnsupportedFloatWidth),
                }
            }
        };

        let mut bv = BitVec::with_capacity(d.bitlen as usize);
        bv.push_uint(raw_bits, d.bitlen);
        self.bits = Some(bv);
        Ok(())
    }

    pub fn get_numeric(&self) -> Result<f64, DsdlError> {
        let d = &self.descriptor;
        let bits = self.bits.as_ref().ok_or(DsdlError::UndefinedValue)?;
        let raw = bits.to_uint();
        Ok(match d.kind {
            PrimitiveKind::Boolean => {
                if raw != 0 {
                    1.0
                } else {
                    0.0
                }
            }
            PrimitiveKind::UnsignedInt => raw as f64,
            PrimitiveKind::SignedInt => sign_extend(raw, d.bitlen) as f64,
            PrimitiveKind::Float => match d.bitlen {
                16 => bits::f32_from_f16(raw as u16) as f64,
                32 => f32::from_bits(raw as u32) as f64,
                _ => return Err(DsdlError::UnsupportedFloatWidth),
            },
        })
    }
}

fn mask_to_bitlen(value: u64, bitlen: u8) -> u64 {
    if bitlen >= 64 {
        value
    } else {
        value & ((1u64 << bitlen) - 1)
    }
}

fn sign_extend(raw: u64, bitlen: u8) -> i64 {
    let sign_bit = 1u64 << (bitlen - 1);
    if raw & sign_bit != 0 {
        -(((1u64 << bitlen) - raw) as i64)
    } else {
        raw as i64
    }
}

/// Ordered sequence of child values. Static arrays pre-allocate `max_size`
/// zero-valued children; dynamic arrays start empty.
#[derive(Clone, Debug)]
pub struct ArrayValue {
    element_type: Rc<TypeDescriptor>,
    descriptor: ArrayDescriptor,
    tao: bool,
    items: Vec<Value>,
}

impl ArrayValue {
    fn new(
        _self_type: Rc<TypeDescriptor>,
        descriptor: ArrayDescriptor,
        tao: bool,
    ) -> Result<Self, DsdlError> {
        let element_type = descriptor.value_type.clone();
        let eligible_tao = tao && descriptor.element_bitlen().map_or(false, |w| w >= 8);

        let items = match descriptor.mode {
            ArrayMode::Static => {
                let mut v = Vec::with_capacity(descriptor.max_size);
                for _ in 0..descriptor.max_size {
                    v.push(Value::new_default(&element_type, false)?);
                }
                v
            }
            ArrayMode::Dynamic => Vec::new(),
        };

        Ok(Self {
            element_type,
            descriptor,
            tao: eligible_tao,
            items,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.descriptor.max_size
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.items.get(idx)
    }

    pub fn push(&mut self, value: Value) -> Result<(), DsdlError> {
        if self.items.len() >= self.descriptor.max_size {
            return Err(DsdlError::IndexOutOfRange);
        }
        self.items.push(value);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Appends a primitive element constructed from a raw numeric value
    /// (used by `from_bytes`/`encode` for `uint8[]` byte and string arrays).
    pub fn push_numeric(&mut self, value: f64) -> Result<(), DsdlError> {
        let mut item = Value::new_default(&self.element_type, false)?;
        if let Value::Primitive(p) = &mut item {
            p.set_numeric(value)?;
        }
        self.push(item)
    }

    pub fn from_bytes(&mut self, data: &[u8]) -> Result<(), DsdlError> {
        self.clear();
        for &byte in data {
            self.push_numeric(byte as f64)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<alloc::vec::Vec<u8>, DsdlError> {
        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let p = item.as_primitive().ok_or(DsdlError::IndexOutOfRange)?;
            out.push(p.get_numeric()? as u8);
        }
        Ok(out)
    }

    fn unpack(&mut self, stream: &mut BitVec) -> Result<(), DsdlError> {
        match self.descriptor.mode {
            ArrayMode::Static => {
                for item in self.items.iter_mut() {
                    item.unpack(stream)?;
                }
                Ok(())
            }
            ArrayMode::Dynamic if self.tao => {
                self.items.clear();
                while stream.len() >= 8 {
                    let mut item = Value::new_default(&self.element_type, false)?;
                    item.unpack(stream)?;
                    self.items.push(item);
                }
                Ok(())
            }
            ArrayMode::Dynamic => {
                self.items.clear();
                let width = self.descriptor.count_width() as usize;
                if stream.len() < width {
                    return Err(DsdlError::InsufficientBits);
                }
                let count = stream.take(width).to_uint() as usize;
                if count > self.descriptor.max_size {
                    return Err(DsdlError::IndexOutOfRange);
                }
                for _ in 0..count {
                    let mut item = Value::new_default(&self.element_type, false)?;
                    item.unpack(stream)?;
                    self.items.push(item);
                }
                Ok(())
            }
        }
    }

    fn pack(&self, out: &mut BitVec) {
        match self.descriptor.mode {
            ArrayMode::Static => {
                for item in &self.items {
                    item.pack(out);
                }
                // Static arrays are always fully populated at construction;
                // nothing further to pad.
            }
            ArrayMode::Dynamic if self.tao => {
                for item in &self.items {
                    item.pack(out);
                }
            }
            ArrayMode::Dynamic => {
                let width = self.descriptor.count_width();
                out.push_uint(self.items.len() as u64, width);
                for item in &self.items {
                    item.pack(out);
                }
            }
        }
    }
}

/// Ordered mapping from field name to child value, plus read-only named
/// constants. Service descriptors select the request or response field list
/// at construction time via `mode`.
#[derive(Clone, Debug)]
pub struct CompoundValue {
    descriptor: CompoundDescriptor,
    mode: Option<ServiceMode>,
    field_names: Vec<String>,
    fields: Vec<Value>,
    constants: Vec<(String, f64)>,
}

impl CompoundValue {
    fn new(
        _self_type: Rc<TypeDescriptor>,
        descriptor: CompoundDescriptor,
        mode: Option<ServiceMode>,
        tao: bool,
    ) -> Result<Self, DsdlError> {
        let source_fields: &[Field] = descriptor
            .fields_for(mode)
            .ok_or(DsdlError::MissingServiceMode)?;
        let source_constants = descriptor.constants_for(mode).unwrap_or(&[]);

        let mut field_names = Vec::with_capacity(source_fields.len());
        let mut fields = Vec::with_capacity(source_fields.len());
        let last_index = source_fields.len().checked_sub(1);

        for (i, field) in source_fields.iter().enumerate() {
            let field_tao = tao && last_index == Some(i);
            field_names.push(field.name.clone());
            fields.push(Value::new_default(&field.ty, field_tao)?);
        }

        let constants = source_constants
            .iter()
            .map(|c| (c.name.clone(), c.value))
            .collect();

        Ok(Self {
            descriptor,
            mode,
            field_names,
            fields,
            constants,
        })
    }

    pub fn descriptor(&self) -> &CompoundDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> Option<ServiceMode> {
        self.mode
    }

    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|n| n == name)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        let idx = self.index_of(name)?;
        Some(&mut self.fields[idx])
    }

    /// Reads a named primitive field's unwrapped numeric value.
    pub fn get_numeric(&self, name: &str) -> Result<f64, DsdlError> {
        let field = self.field(name).ok_or(DsdlError::IndexOutOfRange)?;
        field
            .as_primitive()
            .ok_or(DsdlError::IndexOutOfRange)?
            .get_numeric()
    }

    /// Writes a named primitive field (arrays/compounds must be mutated
    /// through their own container, matching §4.3's attribute semantics).
    pub fn set_numeric(&mut self, name: &str, value: f64) -> Result<(), DsdlError> {
        let field = self.field_mut(name).ok_or(DsdlError::IndexOutOfRange)?;
        let p = field.as_primitive_mut().ok_or(DsdlError::IndexOutOfRange)?;
        p.set_numeric(value)
    }

    fn unpack(&mut self, stream: &mut BitVec) -> Result<(), DsdlError> {
        for field in self.fields.iter_mut() {
            field.unpack(stream)?;
        }
        Ok(())
    }

    fn pack(&self, out: &mut BitVec) {
        for field in &self.fields {
            field.pack(out);
        }
    }
}

impl Value {
    pub fn as_primitive_mut(&mut self) -> Option<&mut PrimitiveValue> {
        match self {
            Value::Primitive(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsdl::descriptor::{CastMode, CompoundKind, Constant};

    fn uint_descriptor(bitlen: u8, cast_mode: CastMode) -> Rc<TypeDescriptor> {
        Rc::new(TypeDescriptor::Primitive(PrimitiveDescriptor::unsigned(
            bitlen, cast_mode,
        )))
    }

    #[test]
    fn primitive_roundtrip() {
        let ty = uint_descriptor(8, CastMode::Saturated);
        let mut v = Value::new_default(&ty, false).unwrap();
        v.as_primitive_mut().unwrap().set_numeric(200.0).unwrap();

        let mut out = BitVec::new();
        v.pack(&mut out);

        let mut v2 = Value::new_default(&ty, false).unwrap();
        v2.unpack(&mut out).unwrap();
        assert_eq!(
            v.as_primitive().unwrap().get_numeric().unwrap(),
            v2.as_primitive().unwrap().get_numeric().unwrap()
        );
    }

    #[test]
    fn saturated_vs_truncated_cast() {
        let sat = uint_descriptor(8, CastMode::Saturated);
        let mut v = Value::new_default(&sat, false).unwrap();
        v.as_primitive_mut()
            .unwrap()
            .set_numeric(100000.0)
            .unwrap();
        assert_eq!(v.as_primitive().unwrap().get_numeric().unwrap(), 255.0);

        let trunc = uint_descriptor(8, CastMode::Truncated);
        let mut v = Value::new_default(&trunc, false).unwrap();
        v.as_primitive_mut()
            .unwrap()
            .set_numeric(100000.0)
            .unwrap();
        assert_eq!(v.as_primitive().unwrap().get_numeric().unwrap(), 160.0);
    }

    #[test]
    fn tao_elides_prefix_when_last_field() {
        let elem = uint_descriptor(8, CastMode::Saturated);
        let array_ty = Rc::new(TypeDescriptor::Array(ArrayDescriptor {
            value_type: elem,
            mode: ArrayMode::Dynamic,
            max_size: 90,
        }));

        let compound = CompoundDescriptor {
            default_dtid: 1,
            data_type_signature: 0,
            kind_sub: CompoundKind::Message,
            fields: alloc::vec![Field::new("payload", array_ty.clone())],
            constants: Vec::new(),
            request_fields: Vec::new(),
            request_constants: Vec::new(),
            response_fields: Vec::new(),
            response_constants: Vec::new(),
        };
        let compound_ty = Rc::new(TypeDescriptor::Compound(compound));

        let mut value = Value::new_default(&compound_ty, true).unwrap();
        let arr = value
            .as_compound_mut()
            .unwrap()
            .field_mut("payload")
            .unwrap()
            .as_array_mut()
            .unwrap();
        arr.push_numeric(1.0).unwrap();
        arr.push_numeric(2.0).unwrap();
        arr.push_numeric(3.0).unwrap();

        let mut out = BitVec::new();
        value.pack(&mut out);
        // 3 bytes, no 7-bit length prefix
        assert_eq!(out.len(), 24);
    }

    #[test]
    fn non_final_array_packs_with_prefix() {
        let elem = uint_descriptor(8, CastMode::Saturated);
        let array_ty = Rc::new(TypeDescriptor::Array(ArrayDescriptor {
            value_type: elem,
            mode: ArrayMode::Dynamic,
            max_size: 90,
        }));
        let tail = uint_descriptor(8, CastMode::Saturated);

        let compound = CompoundDescriptor {
            default_dtid: 1,
            data_type_signature: 0,
            kind_sub: CompoundKind::Message,
            fields: alloc::vec![
                Field::new("payload", array_ty.clone()),
                Field::new("tail", tail),
            ],
            constants: Vec::new(),
            request_fields: Vec::new(),
            request_constants: Vec::new(),
            response_fields: Vec::new(),
            response_constants: Vec::new(),
        };
        let compound_ty = Rc::new(TypeDescriptor::Compound(compound));

        let mut value = Value::new_default(&compound_ty, true).unwrap();
        let arr = value
            .as_compound_mut()
            .unwrap()
            .field_mut("payload")
            .unwrap()
            .as_array_mut()
            .unwrap();
        arr.push_numeric(1.0).unwrap();
        arr.push_numeric(2.0).unwrap();
        arr.push_numeric(3.0).unwrap();
        value
            .as_compound_mut()
            .unwrap()
            .set_numeric("tail", 9.0)
            .unwrap();

        let mut out = BitVec::new();
        value.pack(&mut out);
        // 7-bit count prefix (0000011) + 3 bytes + 1 trailing byte
        assert_eq!(out.len(), 7 + 24 + 8);
    }

    #[test]
    fn constants_are_exposed_readonly() {
        let ty = Rc::new(TypeDescriptor::Compound(CompoundDescriptor {
            default_dtid: 7,
            data_type_signature: 0,
            kind_sub: CompoundKind::Message,
            fields: Vec::new(),
            constants: alloc::vec![Constant {
                name: String::from("OK"),
                value: 0.0,
            }],
            request_fields: Vec::new(),
            request_constants: Vec::new(),
            response_fields: Vec::new(),
            response_constants: Vec::new(),
        }));
        let value = Value::new_default(&ty, false).unwrap();
        assert_eq!(value.as_compound().unwrap().constant("OK"), Some(0.0));
    }
}
