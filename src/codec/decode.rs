//! Decoding driver: wire bytes -> message value.
//!
//! Reads key/value pairs until the input is exhausted. Unknown tags are
//! captured verbatim into the value's side channel; known fields dispatch on
//! the descriptor's kind and cardinality, with packed/unpacked tolerance in
//! both directions for packable scalars.

use bytes::{Buf, Bytes};

use crate::error::DecodeError;
use crate::schema::descriptor::FieldInner;
use crate::schema::{Cardinality, Kind, MessageDescriptor, MessageId};
use crate::value::{MapKey, MessageValue, UnknownField, Value};
use crate::wire::{self, WireType};

/// Decode a message body into `value`, following protobuf merge semantics.
pub(crate) fn decode_into(value: &mut MessageValue, data: &[u8]) -> Result<(), DecodeError> {
    // The descriptor handle is cloned so field metadata can be borrowed
    // while the value is mutated.
    let desc = value.desc.clone();
    let inner = desc.inner();
    if !inner.fields_defined && !data.is_empty() {
        return Err(DecodeError::SchemaIncomplete {
            message: inner.full_name.clone(),
        });
    }

    let mut slice = data;
    while !slice.is_empty() {
        let (wire_type, tag) = wire::decode_key(&mut slice)?.into_parts();
        match inner.fields.get(&tag) {
            Some(field) => decode_field(value, &desc, field, wire_type, &mut slice)?,
            None => {
                let before = slice;
                wire::skip_field(wire_type, &mut slice)?;
                let consumed = before.len() - slice.len();
                value.unknown.push(UnknownField {
                    tag,
                    wire_type,
                    data: Bytes::copy_from_slice(&before[..consumed]),
                });
            }
        }
    }
    Ok(())
}

/// Verify required-field presence across the whole value tree.
pub(crate) fn check_required(value: &MessageValue) -> Result<(), DecodeError> {
    let inner = value.desc.inner();
    for field in inner.fields.values() {
        if field.required && !value.fields.contains_key(&field.tag) {
            return Err(DecodeError::MissingRequired {
                message: inner.full_name.clone(),
                field: field.name.clone(),
            });
        }
    }
    for payload in value.fields.values() {
        match payload {
            Value::Message(nested) => check_required(nested)?,
            Value::List(items) => {
                for item in items {
                    if let Value::Message(nested) = item {
                        check_required(nested)?;
                    }
                }
            }
            Value::Map(map) => {
                for item in map.values() {
                    if let Value::Message(nested) = item {
                        check_required(nested)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn mismatch(field: &FieldInner, expected: WireType, actual: WireType) -> DecodeError {
    DecodeError::WireTypeMismatch {
        field: field.name.clone(),
        expected,
        actual,
    }
}

/// Resolve a message handle against a frozen schema. Handles are validated
/// at schema build time, so the view is constructed directly.
fn message_desc(desc: &MessageDescriptor, id: MessageId) -> MessageDescriptor {
    MessageDescriptor {
        schema: desc.schema().clone(),
        id,
    }
}

fn decode_field(
    value: &mut MessageValue,
    desc: &MessageDescriptor,
    field: &FieldInner,
    wire_type: WireType,
    slice: &mut &[u8],
) -> Result<(), DecodeError> {
    match field.cardinality {
        Cardinality::Singular => match field.kind {
            Kind::Message(id) => {
                if wire_type != WireType::Len {
                    return Err(mismatch(field, WireType::Len, wire_type));
                }
                let data = read_len_delimited(slice)?;
                // Merge semantics: a repeated occurrence of a singular
                // message field decodes into the existing sub-message.
                let merged = match value.fields.get_mut(&field.tag) {
                    Some(Value::Message(existing)) => {
                        decode_into(existing, data)?;
                        true
                    }
                    _ => false,
                };
                if !merged {
                    let mut nested = MessageValue::new(&message_desc(desc, id));
                    decode_into(&mut nested, data)?;
                    value.set_slot(field.tag, field.oneof, Value::Message(nested));
                }
                Ok(())
            }
            kind => {
                if wire_type != kind.wire_type() {
                    return Err(mismatch(field, kind.wire_type(), wire_type));
                }
                let payload = decode_scalar(kind, &field.name, slice)?;
                value.set_slot(field.tag, field.oneof, payload);
                Ok(())
            }
        },
        Cardinality::Repeated { .. } => match field.kind {
            Kind::Message(id) => {
                if wire_type != WireType::Len {
                    return Err(mismatch(field, WireType::Len, wire_type));
                }
                let data = read_len_delimited(slice)?;
                let mut nested = MessageValue::new(&message_desc(desc, id));
                decode_into(&mut nested, data)?;
                value.push_repeated(field.tag, Value::Message(nested));
                Ok(())
            }
            kind if kind.is_packable() => {
                // Tolerate both representations regardless of the declared
                // one: a Len record is a packed run, the element wire type
                // is a single unpacked element.
                if wire_type == WireType::Len {
                    let mut data = read_len_delimited(slice)?;
                    while !data.is_empty() {
                        let item = decode_scalar(kind, &field.name, &mut data)?;
                        value.push_repeated(field.tag, item);
                    }
                    Ok(())
                } else if wire_type == kind.wire_type() {
                    let item = decode_scalar(kind, &field.name, slice)?;
                    value.push_repeated(field.tag, item);
                    Ok(())
                } else {
                    Err(mismatch(field, kind.wire_type(), wire_type))
                }
            }
            kind => {
                // string / bytes
                if wire_type != WireType::Len {
                    return Err(mismatch(field, WireType::Len, wire_type));
                }
                let item = decode_scalar(kind, &field.name, slice)?;
                value.push_repeated(field.tag, item);
                Ok(())
            }
        },
        Cardinality::Map => {
            if wire_type != WireType::Len {
                return Err(mismatch(field, WireType::Len, wire_type));
            }
            let data = read_len_delimited(slice)?;
            let (key, item) = decode_map_entry(desc, field, data)?;
            value.insert_map_entry(field.tag, key, item);
            Ok(())
        }
    }
}

/// Decode one synthetic `{key = 1, value = 2}` entry record.
///
/// Absent slots take the zero value of their kind (an empty message for
/// message-valued maps); unknown entry tags are skipped.
fn decode_map_entry(
    desc: &MessageDescriptor,
    field: &FieldInner,
    mut data: &[u8],
) -> Result<(MapKey, Value), DecodeError> {
    let entry_id = match field.kind {
        Kind::Message(id) => id,
        _ => {
            return Err(DecodeError::ProgrammingError {
                reason: "map field does not reference its entry type",
            })
        }
    };
    let entry = desc.schema().message_inner(entry_id);
    let (key_kind, value_kind) = match (entry.fields.get(&1), entry.fields.get(&2)) {
        (Some(key), Some(value)) => (key.kind, value.kind),
        _ => {
            return Err(DecodeError::ProgrammingError {
                reason: "map entry type is missing its key/value fields",
            })
        }
    };

    let mut key = None;
    let mut item = None;
    while !data.is_empty() {
        let (wire_type, tag) = wire::decode_key(&mut data)?.into_parts();
        match tag {
            1 => {
                if wire_type != key_kind.wire_type() {
                    return Err(mismatch(field, key_kind.wire_type(), wire_type));
                }
                let payload = decode_scalar(key_kind, &field.name, &mut data)?;
                key = Some(map_key_of(key_kind, payload));
            }
            2 => match value_kind {
                Kind::Message(id) => {
                    if wire_type != WireType::Len {
                        return Err(mismatch(field, WireType::Len, wire_type));
                    }
                    let nested_data = read_len_delimited(&mut data)?;
                    let mut nested = MessageValue::new(&message_desc(desc, id));
                    decode_into(&mut nested, nested_data)?;
                    item = Some(Value::Message(nested));
                }
                kind => {
                    if wire_type != kind.wire_type() {
                        return Err(mismatch(field, kind.wire_type(), wire_type));
                    }
                    item = Some(decode_scalar(kind, &field.name, &mut data)?);
                }
            },
            _ => wire::skip_field(wire_type, &mut data)?,
        }
    }

    let key = key.unwrap_or_else(|| MapKey::zero_of(key_kind));
    let item = item.unwrap_or_else(|| match value_kind {
        Kind::Message(id) => Value::Message(MessageValue::new(&message_desc(desc, id))),
        kind => Value::zero_of(kind),
    });
    Ok((key, item))
}

fn map_key_of(kind: Kind, payload: Value) -> MapKey {
    match payload {
        Value::Bool(v) => MapKey::Bool(v),
        Value::I32(v) => MapKey::I32(v),
        Value::I64(v) => MapKey::I64(v),
        Value::U32(v) => MapKey::U32(v),
        Value::U64(v) => MapKey::U64(v),
        Value::String(v) => MapKey::String(v),
        _ => MapKey::zero_of(kind),
    }
}

/// Split a length-delimited payload off the front of `slice`.
fn read_len_delimited<'a>(slice: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = wire::decode_len(slice)?;
    if slice.len() < len {
        return Err(DecodeError::Truncated {
            needed: len,
            remaining: slice.len(),
        });
    }
    let (data, rest) = slice.split_at(len);
    *slice = rest;
    Ok(data)
}

fn out_of_range(field: &str) -> DecodeError {
    DecodeError::OutOfRange {
        field: field.to_owned(),
    }
}

/// Decode one scalar body of the given kind into its canonical payload.
///
/// Varint kinds interpret the full 64-bit two's-complement value and then
/// range-check against the declared width, keeping decode symmetric with
/// the setter checks.
fn decode_scalar(kind: Kind, field: &str, slice: &mut &[u8]) -> Result<Value, DecodeError> {
    use crate::leb128::LebCodec;

    let check_fixed = |slice: &&[u8], needed: usize| {
        if slice.len() < needed {
            Err(DecodeError::Truncated {
                needed,
                remaining: slice.len(),
            })
        } else {
            Ok(())
        }
    };

    match kind {
        Kind::Int32 => {
            let raw = u64::decode_leb128_buf(slice)? as i64;
            let v = i32::try_from(raw).map_err(|_| out_of_range(field))?;
            Ok(Value::I32(v))
        }
        Kind::Int64 => {
            let raw = u64::decode_leb128_buf(slice)?;
            Ok(Value::I64(raw as i64))
        }
        Kind::Uint32 => {
            let raw = u64::decode_leb128_buf(slice)?;
            let v = u32::try_from(raw).map_err(|_| out_of_range(field))?;
            Ok(Value::U32(v))
        }
        Kind::Uint64 => {
            let raw = u64::decode_leb128_buf(slice)?;
            Ok(Value::U64(raw))
        }
        Kind::Sint32 => {
            let raw = u64::decode_leb128_buf(slice)?;
            let v = u32::try_from(raw).map_err(|_| out_of_range(field))?;
            Ok(Value::I32(wire::zigzag_decode_32(v)))
        }
        Kind::Sint64 => {
            let raw = u64::decode_leb128_buf(slice)?;
            Ok(Value::I64(wire::zigzag_decode_64(raw)))
        }
        Kind::Bool => {
            let raw = u64::decode_leb128_buf(slice)?;
            Ok(Value::Bool(raw != 0))
        }
        Kind::Enum(_) => {
            let raw = u64::decode_leb128_buf(slice)? as i64;
            let v = i32::try_from(raw).map_err(|_| out_of_range(field))?;
            Ok(Value::Enum(v))
        }
        Kind::Fixed32 => {
            check_fixed(slice, 4)?;
            Ok(Value::U32(slice.get_u32_le()))
        }
        Kind::Sfixed32 => {
            check_fixed(slice, 4)?;
            Ok(Value::I32(slice.get_i32_le()))
        }
        Kind::Float => {
            check_fixed(slice, 4)?;
            Ok(Value::F32(slice.get_f32_le()))
        }
        Kind::Fixed64 => {
            check_fixed(slice, 8)?;
            Ok(Value::U64(slice.get_u64_le()))
        }
        Kind::Sfixed64 => {
            check_fixed(slice, 8)?;
            Ok(Value::I64(slice.get_i64_le()))
        }
        Kind::Double => {
            check_fixed(slice, 8)?;
            Ok(Value::F64(slice.get_f64_le()))
        }
        Kind::String => {
            let data = read_len_delimited(slice)?;
            let text = core::str::from_utf8(data).map_err(|_| DecodeError::InvalidUtf8 {
                field: field.to_owned(),
            })?;
            Ok(Value::String(text.to_owned()))
        }
        Kind::Bytes => {
            let data = read_len_delimited(slice)?;
            Ok(Value::Bytes(Bytes::copy_from_slice(data)))
        }
        // Message bodies are handled by the field dispatcher.
        Kind::Message(_) => Err(DecodeError::ProgrammingError {
            reason: "message bodies are not scalar payloads",
        }),
    }
}
