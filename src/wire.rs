//! Wire format primitives: field keys, wire types, zigzag transforms.

use crate::error::DecodeError;
use crate::leb128::LebCodec;

/// Minimum value of a protobuf field number.
pub const MIN_TAG: u32 = 1;
/// Maximum value of a protobuf field number.
pub const MAX_TAG: u32 = (1 << 29) - 1;
/// First field number of the range reserved by the protobuf implementation.
pub const RESERVED_TAG_START: u32 = 19_000;
/// Last field number of the reserved range.
pub const RESERVED_TAG_END: u32 = 19_999;

/// Denotes the shape of a value in an encoded protobuf message.
///
/// Each field record is a key followed by a payload; the wire type in the key
/// tells the reader how large the payload is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WireType {
    /// Variable length integer.
    ///
    /// Used for: `int32`, `int64`, `uint32`, `uint64`, `sint32`, `sint64`, `bool`, `enum`.
    Varint = 0,
    /// 64-bit little-endian value.
    ///
    /// Used for: `fixed64`, `sfixed64`, `double`.
    I64 = 1,
    /// Length-prefixed payload.
    ///
    /// Used for: `string`, `bytes`, `message`, packed `repeated` fields.
    Len = 2,
    /// Group start (deprecated).
    SGroup = 3,
    /// Group end (deprecated).
    EGroup = 4,
    /// 32-bit little-endian value.
    ///
    /// Used for: `fixed32`, `sfixed32`, `float`.
    I32 = 5,
}

impl WireType {
    /// Try to decode a [`WireType`] from the provided raw value.
    #[inline]
    pub fn try_from_val(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::SGroup),
            4 => Ok(WireType::EGroup),
            5 => Ok(WireType::I32),
            _ => Err(DecodeError::InvalidWireType { value }),
        }
    }

    /// Return the raw value for this [`WireType`].
    #[inline]
    pub const fn into_val(self) -> u8 {
        self as u8
    }
}

/// A decoded protobuf field key: wire type plus field number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtoKey {
    wire_type: WireType,
    tag: u32,
}

impl ProtoKey {
    /// Validate a raw key value, rejecting undefined wire types, group
    /// markers, and out-of-range field numbers.
    fn try_from_raw(raw: u32) -> Result<Self, DecodeError> {
        let wire_type = WireType::try_from_val((raw & 0b111) as u8)?;
        if matches!(wire_type, WireType::SGroup | WireType::EGroup) {
            return Err(DecodeError::GroupUnsupported);
        }

        let tag = raw >> 3;
        if !(MIN_TAG..=MAX_TAG).contains(&tag) {
            return Err(DecodeError::TagOutOfRange { tag });
        }

        Ok(ProtoKey { wire_type, tag })
    }

    /// Returns the [`WireType`] component of this key.
    #[inline]
    pub const fn wire_type(self) -> WireType {
        self.wire_type
    }

    /// Returns the field number component of this key.
    #[inline]
    pub const fn tag(self) -> u32 {
        self.tag
    }

    /// Decomposes this key into its [`WireType`] and field number.
    #[inline]
    pub const fn into_parts(self) -> (WireType, u32) {
        (self.wire_type, self.tag)
    }
}

/// Encodes the provided field number and wire type as a protobuf field key.
///
/// Follows the "Message Structure" section of
/// <https://protobuf.dev/programming-guides/encoding>.
#[inline]
pub fn encode_key<B: bytes::BufMut>(wire_type: WireType, tag: u32, buf: &mut B) {
    let key = (tag << 3) | u32::from(wire_type.into_val());
    key.encode_leb128(buf);
}

/// Returns the encoded length of a field key.
///
/// The wire type occupies the low three bits and never changes the length.
#[inline]
pub fn encoded_key_len(tag: u32) -> usize {
    (tag << 3).encoded_leb128_len()
}

/// Decodes a field key from the front of the buffer.
///
/// Keys always fit in `u32`: the maximum field number is `2^29 - 1`, so the
/// maximum raw key is `u32::MAX`.
#[inline]
pub fn decode_key<B: bytes::Buf>(buf: &mut B) -> Result<ProtoKey, DecodeError> {
    let raw = u32::decode_leb128_buf(buf)?;
    ProtoKey::try_from_raw(raw)
}

/// Decodes the length prefix of a length-delimited payload.
///
/// The caller is responsible for bounds-checking the returned length against
/// the remaining input.
#[inline]
pub fn decode_len<B: bytes::Buf>(buf: &mut B) -> Result<usize, DecodeError> {
    let len = u64::decode_leb128_buf(buf)?;
    usize::try_from(len).map_err(|_| DecodeError::LengthOverflow { value: len })
}

/// Skips over a field payload based on its wire type.
///
/// Protobuf stays backwards and forwards compatible by letting readers skip
/// fields they do not know; skipping advances the buffer past the payload.
pub fn skip_field<B: bytes::Buf>(wire_type: WireType, buf: &mut B) -> Result<(), DecodeError> {
    let skip = match wire_type {
        WireType::Varint => {
            u64::decode_leb128_buf(buf)?;
            return Ok(());
        }
        WireType::I64 => 8,
        WireType::Len => decode_len(buf)?,
        WireType::I32 => 4,
        WireType::SGroup | WireType::EGroup => {
            return Err(DecodeError::GroupUnsupported);
        }
    };

    if buf.remaining() < skip {
        return Err(DecodeError::Truncated {
            needed: skip,
            remaining: buf.remaining(),
        });
    }
    buf.advance(skip);
    Ok(())
}

/// Zigzag-encode a signed 32-bit value so small negatives stay small.
#[inline]
pub const fn zigzag_encode_32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Inverse of [`zigzag_encode_32`].
#[inline]
pub const fn zigzag_decode_32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Zigzag-encode a signed 64-bit value so small negatives stay small.
#[inline]
pub const fn zigzag_encode_64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode_64`].
#[inline]
pub const fn zigzag_decode_64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
