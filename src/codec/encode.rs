//! Encoding driver: message value -> wire bytes.
//!
//! Uses the two-pass strategy for length-delimited payloads: measure with
//! the `*_len` helpers, then write. The measure pass also performs the
//! required-field and schema-completeness checks, so the write pass never
//! fails on a value the measure pass accepted.

use bytes::BufMut;

use crate::error::EncodeError;
use crate::leb128::LebCodec;
use crate::schema::{Cardinality, Kind, MessageDescriptor};
use crate::schema::descriptor::FieldInner;
use crate::value::{MapKey, MessageValue, Value};
use crate::wire::{self, WireType};

/// Encoded length of the message body, without any outer length prefix.
pub(crate) fn encoded_message_len(value: &MessageValue) -> Result<usize, EncodeError> {
    let inner = value.desc.inner();
    if !inner.fields_defined && !value.is_empty() {
        return Err(EncodeError::SchemaIncomplete {
            message: inner.full_name.clone(),
        });
    }

    let mut len = 0;
    for field in inner.fields.values() {
        match value.fields.get(&field.tag) {
            None => {
                if field.required {
                    return Err(EncodeError::MissingRequired {
                        message: inner.full_name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
            Some(payload) => len += encoded_field_len(&value.desc, field, payload)?,
        }
    }
    for unknown in &value.unknown {
        len += wire::encoded_key_len(unknown.tag) + unknown.data.len();
    }
    Ok(len)
}

/// Write the message body. Walks declared fields in ascending tag order,
/// then replays unknown fields verbatim in decode order.
pub(crate) fn encode_message<B: BufMut>(
    value: &MessageValue,
    buf: &mut B,
) -> Result<(), EncodeError> {
    let inner = value.desc.inner();
    if !inner.fields_defined && !value.is_empty() {
        return Err(EncodeError::SchemaIncomplete {
            message: inner.full_name.clone(),
        });
    }

    for field in inner.fields.values() {
        match value.fields.get(&field.tag) {
            None => {
                if field.required {
                    return Err(EncodeError::MissingRequired {
                        message: inner.full_name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
            Some(payload) => encode_field(&value.desc, field, payload, buf)?,
        }
    }
    for unknown in &value.unknown {
        wire::encode_key(unknown.wire_type, unknown.tag, buf);
        buf.put_slice(&unknown.data);
    }
    Ok(())
}

fn invalid_payload(field: &FieldInner) -> EncodeError {
    EncodeError::InvalidPayload {
        field: field.name.clone(),
    }
}

fn encoded_field_len(
    desc: &MessageDescriptor,
    field: &FieldInner,
    payload: &Value,
) -> Result<usize, EncodeError> {
    let key_len = wire::encoded_key_len(field.tag);

    match field.cardinality {
        Cardinality::Singular => match payload {
            Value::Message(nested) => {
                let body = encoded_message_len(nested)?;
                Ok(key_len + (body as u64).encoded_leb128_len() + body)
            }
            _ => Ok(key_len + scalar_body_len(field, payload)?),
        },
        Cardinality::Repeated { packed } => {
            let items = match payload {
                Value::List(items) => items,
                _ => return Err(invalid_payload(field)),
            };
            if items.is_empty() {
                return Ok(0);
            }
            if packed && field.kind.is_packable() {
                let mut body = 0;
                for item in items {
                    body += scalar_body_len(field, item)?;
                }
                Ok(key_len + (body as u64).encoded_leb128_len() + body)
            } else if let Kind::Message(_) = field.kind {
                let mut len = 0;
                for item in items {
                    let nested = match item {
                        Value::Message(nested) => nested,
                        _ => return Err(invalid_payload(field)),
                    };
                    let body = encoded_message_len(nested)?;
                    len += key_len + (body as u64).encoded_leb128_len() + body;
                }
                Ok(len)
            } else {
                let mut len = 0;
                for item in items {
                    len += key_len + scalar_body_len(field, item)?;
                }
                Ok(len)
            }
        }
        Cardinality::Map => {
            let map = match payload {
                Value::Map(map) => map,
                _ => return Err(invalid_payload(field)),
            };
            let (key_kind, value_kind) = map_entry_kinds(desc, field)?;
            let mut len = 0;
            for (key, item) in map {
                let body = entry_body_len(field, key_kind, value_kind, key, item)?;
                len += key_len + (body as u64).encoded_leb128_len() + body;
            }
            Ok(len)
        }
    }
}

fn encode_field<B: BufMut>(
    desc: &MessageDescriptor,
    field: &FieldInner,
    payload: &Value,
    buf: &mut B,
) -> Result<(), EncodeError> {
    match field.cardinality {
        Cardinality::Singular => match payload {
            Value::Message(nested) => {
                wire::encode_key(WireType::Len, field.tag, buf);
                encode_nested(nested, buf)
            }
            _ => {
                wire::encode_key(field.kind.wire_type(), field.tag, buf);
                encode_scalar_body(field, payload, buf)
            }
        },
        Cardinality::Repeated { packed } => {
            let items = match payload {
                Value::List(items) => items,
                _ => return Err(invalid_payload(field)),
            };
            if items.is_empty() {
                return Ok(());
            }
            if packed && field.kind.is_packable() {
                let mut body = 0;
                for item in items {
                    body += scalar_body_len(field, item)?;
                }
                wire::encode_key(WireType::Len, field.tag, buf);
                (body as u64).encode_leb128(buf);
                for item in items {
                    encode_scalar_body(field, item, buf)?;
                }
                Ok(())
            } else if let Kind::Message(_) = field.kind {
                for item in items {
                    let nested = match item {
                        Value::Message(nested) => nested,
                        _ => return Err(invalid_payload(field)),
                    };
                    wire::encode_key(WireType::Len, field.tag, buf);
                    encode_nested(nested, buf)?;
                }
                Ok(())
            } else {
                for item in items {
                    wire::encode_key(field.kind.wire_type(), field.tag, buf);
                    encode_scalar_body(field, item, buf)?;
                }
                Ok(())
            }
        }
        Cardinality::Map => {
            let map = match payload {
                Value::Map(map) => map,
                _ => return Err(invalid_payload(field)),
            };
            let (key_kind, value_kind) = map_entry_kinds(desc, field)?;
            for (key, item) in map {
                let body = entry_body_len(field, key_kind, value_kind, key, item)?;
                wire::encode_key(WireType::Len, field.tag, buf);
                (body as u64).encode_leb128(buf);
                encode_entry_body(field, key_kind, value_kind, key, item, buf)?;
            }
            Ok(())
        }
    }
}

/// Write a nested message as a length-delimited payload: measure, prefix,
/// body.
fn encode_nested<B: BufMut>(nested: &MessageValue, buf: &mut B) -> Result<(), EncodeError> {
    let body = encoded_message_len(nested)?;
    (body as u64).encode_leb128(buf);
    encode_message(nested, buf)
}

/// Key and value kinds of a map field, read from its synthetic entry type.
fn map_entry_kinds(
    desc: &MessageDescriptor,
    field: &FieldInner,
) -> Result<(Kind, Kind), EncodeError> {
    if let Kind::Message(entry_id) = field.kind {
        let entry = desc.schema().message_inner(entry_id);
        if let (Some(key), Some(value)) = (entry.fields.get(&1), entry.fields.get(&2)) {
            return Ok((key.kind, value.kind));
        }
    }
    Err(invalid_payload(field))
}

/// Length of one map entry body. Zero-valued keys and scalar values are
/// omitted, matching the reference implementation; message values are
/// always present once the entry exists.
fn entry_body_len(
    field: &FieldInner,
    key_kind: Kind,
    value_kind: Kind,
    key: &MapKey,
    item: &Value,
) -> Result<usize, EncodeError> {
    let mut len = 0;
    let key_payload = key.to_value();
    if !is_zero_scalar(&key_payload) {
        len += wire::encoded_key_len(1) + scalar_body_len_of(key_kind, field, &key_payload)?;
    }
    match item {
        Value::Message(nested) => {
            let body = encoded_message_len(nested)?;
            len += wire::encoded_key_len(2) + (body as u64).encoded_leb128_len() + body;
        }
        _ => {
            if !is_zero_scalar(item) {
                len += wire::encoded_key_len(2) + scalar_body_len_of(value_kind, field, item)?;
            }
        }
    }
    Ok(len)
}

fn encode_entry_body<B: BufMut>(
    field: &FieldInner,
    key_kind: Kind,
    value_kind: Kind,
    key: &MapKey,
    item: &Value,
    buf: &mut B,
) -> Result<(), EncodeError> {
    let key_payload = key.to_value();
    if !is_zero_scalar(&key_payload) {
        wire::encode_key(key_kind.wire_type(), 1, buf);
        encode_scalar_body_of(key_kind, field, &key_payload, buf)?;
    }
    match item {
        Value::Message(nested) => {
            wire::encode_key(WireType::Len, 2, buf);
            encode_nested(nested, buf)?;
        }
        _ => {
            if !is_zero_scalar(item) {
                wire::encode_key(value_kind.wire_type(), 2, buf);
                encode_scalar_body_of(value_kind, field, item, buf)?;
            }
        }
    }
    Ok(())
}

fn is_zero_scalar(value: &Value) -> bool {
    match value {
        Value::Bool(v) => !v,
        Value::I32(v) => *v == 0,
        Value::I64(v) => *v == 0,
        Value::U32(v) => *v == 0,
        Value::U64(v) => *v == 0,
        Value::F32(v) => v.to_bits() == 0,
        Value::F64(v) => v.to_bits() == 0,
        Value::String(v) => v.is_empty(),
        Value::Bytes(v) => v.is_empty(),
        Value::Enum(v) => *v == 0,
        Value::Message(_) | Value::List(_) | Value::Map(_) => false,
    }
}

fn scalar_body_len(field: &FieldInner, payload: &Value) -> Result<usize, EncodeError> {
    scalar_body_len_of(field.kind, field, payload)
}

fn encode_scalar_body<B: BufMut>(
    field: &FieldInner,
    payload: &Value,
    buf: &mut B,
) -> Result<(), EncodeError> {
    encode_scalar_body_of(field.kind, field, payload, buf)
}

/// Length of a scalar body for the given kind, excluding the field key.
///
/// Negative `int32`/`int64`/`enum` values sign-extend to the full ten-byte
/// varint, per the reference implementation.
fn scalar_body_len_of(kind: Kind, field: &FieldInner, payload: &Value) -> Result<usize, EncodeError> {
    let len = match (kind, payload) {
        (Kind::Int32, Value::I32(v)) => (*v as i64 as u64).encoded_leb128_len(),
        (Kind::Int64, Value::I64(v)) => (*v as u64).encoded_leb128_len(),
        (Kind::Uint32, Value::U32(v)) => v.encoded_leb128_len(),
        (Kind::Uint64, Value::U64(v)) => v.encoded_leb128_len(),
        (Kind::Sint32, Value::I32(v)) => wire::zigzag_encode_32(*v).encoded_leb128_len(),
        (Kind::Sint64, Value::I64(v)) => wire::zigzag_encode_64(*v).encoded_leb128_len(),
        (Kind::Enum(_), Value::Enum(v)) => (*v as i64 as u64).encoded_leb128_len(),
        (Kind::Bool, Value::Bool(_)) => 1,
        (Kind::Fixed32, Value::U32(_))
        | (Kind::Sfixed32, Value::I32(_))
        | (Kind::Float, Value::F32(_)) => 4,
        (Kind::Fixed64, Value::U64(_))
        | (Kind::Sfixed64, Value::I64(_))
        | (Kind::Double, Value::F64(_)) => 8,
        (Kind::String, Value::String(v)) => {
            (v.len() as u64).encoded_leb128_len() + v.len()
        }
        (Kind::Bytes, Value::Bytes(v)) => (v.len() as u64).encoded_leb128_len() + v.len(),
        _ => return Err(invalid_payload(field)),
    };
    Ok(len)
}

fn encode_scalar_body_of<B: BufMut>(
    kind: Kind,
    field: &FieldInner,
    payload: &Value,
    buf: &mut B,
) -> Result<(), EncodeError> {
    match (kind, payload) {
        (Kind::Int32, Value::I32(v)) => {
            (*v as i64 as u64).encode_leb128(buf);
        }
        (Kind::Int64, Value::I64(v)) => {
            (*v as u64).encode_leb128(buf);
        }
        (Kind::Uint32, Value::U32(v)) => {
            v.encode_leb128(buf);
        }
        (Kind::Uint64, Value::U64(v)) => {
            v.encode_leb128(buf);
        }
        (Kind::Sint32, Value::I32(v)) => {
            wire::zigzag_encode_32(*v).encode_leb128(buf);
        }
        (Kind::Sint64, Value::I64(v)) => {
            wire::zigzag_encode_64(*v).encode_leb128(buf);
        }
        (Kind::Enum(_), Value::Enum(v)) => {
            (*v as i64 as u64).encode_leb128(buf);
        }
        (Kind::Bool, Value::Bool(v)) => {
            buf.put_u8(u8::from(*v));
        }
        (Kind::Fixed32, Value::U32(v)) => {
            buf.put_u32_le(*v);
        }
        (Kind::Sfixed32, Value::I32(v)) => {
            buf.put_i32_le(*v);
        }
        (Kind::Float, Value::F32(v)) => {
            buf.put_f32_le(*v);
        }
        (Kind::Fixed64, Value::U64(v)) => {
            buf.put_u64_le(*v);
        }
        (Kind::Sfixed64, Value::I64(v)) => {
            buf.put_i64_le(*v);
        }
        (Kind::Double, Value::F64(v)) => {
            buf.put_f64_le(*v);
        }
        (Kind::String, Value::String(v)) => {
            (v.len() as u64).encode_leb128(buf);
            buf.put_slice(v.as_bytes());
        }
        (Kind::Bytes, Value::Bytes(v)) => {
            (v.len() as u64).encode_leb128(buf);
            buf.put_slice(v);
        }
        _ => return Err(invalid_payload(field)),
    }
    Ok(())
}
