//! End-to-end encode/decode scenarios with literal wire bytes.

use bytes::Bytes;
use protox::{FieldSpec, Kind, MessageValue, Schema, SchemaBuilder, Value};

fn simple_message() -> Schema {
    let mut builder = SchemaBuilder::new();
    let msg = builder.register_message("SimpleMessage", None).unwrap();
    builder
        .add_field(msg, FieldSpec::new("x", 1, Kind::Int32))
        .unwrap();
    builder.freeze().unwrap()
}

#[test]
fn test_single_int32_field() {
    let schema = simple_message();
    let desc = schema.message("SimpleMessage").unwrap();

    let mut value = MessageValue::new(&desc);
    value.set("x", Value::I32(1)).unwrap();

    let bytes = value.to_bytes().unwrap();
    assert_eq!(bytes, [0x08, 0x01]);

    let decoded = MessageValue::from_bytes(&desc, &bytes).unwrap();
    assert_eq!(decoded.get("x").unwrap(), Some(Value::I32(1)));
    assert_eq!(decoded, value);
}

#[test]
fn test_default_not_encoded() {
    let mut builder = SchemaBuilder::new();
    let msg = builder.register_message("SimpleMessage", None).unwrap();
    builder
        .add_field(
            msg,
            FieldSpec::new("x", 1, Kind::Int32).default_value(Value::I32(123)),
        )
        .unwrap();
    let schema = builder.freeze().unwrap();
    let desc = schema.message("SimpleMessage").unwrap();

    let value = MessageValue::new(&desc);
    // No set fields: the encoding is empty, the default is only visible
    // through the accessor.
    assert_eq!(value.to_bytes().unwrap(), Vec::<u8>::new());
    assert_eq!(value.get("x").unwrap(), Some(Value::I32(123)));
    assert!(!value.has("x").unwrap());

    let decoded = MessageValue::from_bytes(&desc, &[]).unwrap();
    assert!(!decoded.has("x").unwrap());
}

#[test]
fn test_negative_int32_sign_extends() {
    let schema = simple_message();
    let desc = schema.message("SimpleMessage").unwrap();

    let mut value = MessageValue::new(&desc);
    value.set("x", Value::I32(-1)).unwrap();

    // Negative int32 values are encoded as the ten-byte two's-complement
    // varint, exactly like the reference implementation.
    let bytes = value.to_bytes().unwrap();
    assert_eq!(
        bytes,
        [0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
    );

    let decoded = MessageValue::from_bytes(&desc, &bytes).unwrap();
    assert_eq!(decoded.get("x").unwrap(), Some(Value::I32(-1)));
}

#[test]
fn test_sint32_stays_small() {
    let mut builder = SchemaBuilder::new();
    let msg = builder.register_message("Zig", None).unwrap();
    builder
        .add_field(msg, FieldSpec::new("x", 1, Kind::Sint32))
        .unwrap();
    let schema = builder.freeze().unwrap();
    let desc = schema.message("Zig").unwrap();

    let mut value = MessageValue::new(&desc);
    value.set("x", Value::I32(-1)).unwrap();
    assert_eq!(value.to_bytes().unwrap(), [0x08, 0x01]);

    value.set("x", Value::I32(-2)).unwrap();
    assert_eq!(value.to_bytes().unwrap(), [0x08, 0x03]);
}

#[test]
fn test_nested_message() {
    let mut builder = SchemaBuilder::new();
    let phone = builder.register_message("PhoneNumber", None).unwrap();
    builder
        .add_field(phone, FieldSpec::new("number", 1, Kind::String))
        .unwrap();
    let user = builder.register_message("User", None).unwrap();
    builder
        .add_field(user, FieldSpec::new("phone", 1, Kind::Message(phone)))
        .unwrap();
    let schema = builder.freeze().unwrap();

    let phone_desc = schema.message("PhoneNumber").unwrap();
    let user_desc = schema.message("User").unwrap();

    let mut phone_value = MessageValue::new(&phone_desc);
    phone_value
        .set("number", Value::String("555".to_owned()))
        .unwrap();
    let mut user_value = MessageValue::new(&user_desc);
    user_value
        .set("phone", Value::Message(phone_value))
        .unwrap();

    let bytes = user_value.to_bytes().unwrap();
    assert_eq!(bytes, [0x0A, 0x05, 0x0A, 0x03, 0x35, 0x35, 0x35]);

    let decoded = MessageValue::from_bytes(&user_desc, &bytes).unwrap();
    assert_eq!(decoded, user_value);
}

fn every_kind_schema() -> Schema {
    let mut builder = SchemaBuilder::new();
    let status = builder
        .register_enum("Status", &[("UNKNOWN", 0), ("ACTIVE", 1)])
        .unwrap();
    let inner = builder.register_message("Inner", None).unwrap();
    builder
        .add_field(inner, FieldSpec::new("id", 1, Kind::Uint64))
        .unwrap();

    let msg = builder.register_message("Everything", None).unwrap();
    let fields = vec![
        FieldSpec::new("f_int32", 1, Kind::Int32),
        FieldSpec::new("f_int64", 2, Kind::Int64),
        FieldSpec::new("f_uint32", 3, Kind::Uint32),
        FieldSpec::new("f_uint64", 4, Kind::Uint64),
        FieldSpec::new("f_sint32", 5, Kind::Sint32),
        FieldSpec::new("f_sint64", 6, Kind::Sint64),
        FieldSpec::new("f_fixed32", 7, Kind::Fixed32),
        FieldSpec::new("f_fixed64", 8, Kind::Fixed64),
        FieldSpec::new("f_sfixed32", 9, Kind::Sfixed32),
        FieldSpec::new("f_sfixed64", 10, Kind::Sfixed64),
        FieldSpec::new("f_float", 11, Kind::Float),
        FieldSpec::new("f_double", 12, Kind::Double),
        FieldSpec::new("f_bool", 13, Kind::Bool),
        FieldSpec::new("f_string", 14, Kind::String),
        FieldSpec::new("f_bytes", 15, Kind::Bytes),
        FieldSpec::new("f_status", 16, Kind::Enum(status)),
        FieldSpec::new("f_inner", 17, Kind::Message(inner)),
        FieldSpec::new("f_repeated", 18, Kind::Int32).packed(),
        FieldSpec::map("f_map", 20, Kind::String, Kind::Int32),
    ];
    builder.define_fields(msg, fields).unwrap();
    builder.freeze().unwrap()
}

#[test]
fn test_every_kind_roundtrip() {
    let schema = every_kind_schema();
    let desc = schema.message("Everything").unwrap();
    let inner_desc = schema.message("Inner").unwrap();

    let mut inner = MessageValue::new(&inner_desc);
    inner.set("id", Value::U64(99)).unwrap();

    let mut value = MessageValue::new(&desc);
    value.set("f_int32", Value::I32(-42)).unwrap();
    value.set("f_int64", Value::I64(i64::MIN)).unwrap();
    value.set("f_uint32", Value::U32(u32::MAX)).unwrap();
    value.set("f_uint64", Value::U64(u64::MAX)).unwrap();
    value.set("f_sint32", Value::I32(i32::MIN)).unwrap();
    value.set("f_sint64", Value::I64(i64::MAX)).unwrap();
    value.set("f_fixed32", Value::U32(7)).unwrap();
    value.set("f_fixed64", Value::U64(8)).unwrap();
    value.set("f_sfixed32", Value::I32(-9)).unwrap();
    value.set("f_sfixed64", Value::I64(-10)).unwrap();
    value.set("f_float", Value::F32(1.5)).unwrap();
    value.set("f_double", Value::F64(-2.25)).unwrap();
    value.set("f_bool", Value::Bool(true)).unwrap();
    value
        .set("f_string", Value::String("hello world! \u{1F389}".to_owned()))
        .unwrap();
    value
        .set("f_bytes", Value::Bytes(Bytes::from_static(&[0, 1, 2, 255])))
        .unwrap();
    value.set("f_status", Value::Enum(1)).unwrap();
    value.set("f_inner", Value::Message(inner)).unwrap();
    value
        .set(
            "f_repeated",
            Value::List(vec![Value::I32(1), Value::I32(-1), Value::I32(300)]),
        )
        .unwrap();
    let mut map = indexmap::IndexMap::new();
    map.insert(protox::MapKey::String("a".to_owned()), Value::I32(1));
    map.insert(protox::MapKey::String("b".to_owned()), Value::I32(2));
    value.set("f_map", Value::Map(map)).unwrap();

    let bytes = value.to_bytes().unwrap();
    let decoded = MessageValue::from_bytes(&desc, &bytes).unwrap();
    assert_eq!(decoded, value);

    // Encode determinism: repeated encodes are byte-identical.
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
    assert_eq!(value.to_bytes().unwrap(), bytes);
}

#[test]
fn test_fixed_width_bytes() {
    let schema = every_kind_schema();
    let desc = schema.message("Everything").unwrap();

    let mut value = MessageValue::new(&desc);
    value.set("f_fixed32", Value::U32(0x0102_0304)).unwrap();
    let bytes = value.to_bytes().unwrap();
    // Key (7 << 3 | 5), then the little-endian body.
    assert_eq!(bytes, [0x3D, 0x04, 0x03, 0x02, 0x01]);

    let mut value = MessageValue::new(&desc);
    value.set("f_double", Value::F64(1.0)).unwrap();
    let bytes = value.to_bytes().unwrap();
    assert_eq!(bytes, [0x61, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0x3F]);
}

#[test]
fn test_singular_overwrite_on_decode() {
    let schema = simple_message();
    let desc = schema.message("SimpleMessage").unwrap();

    // Two occurrences of tag 1: the later one wins.
    let bytes = [0x08, 0x01, 0x08, 0x05];
    let decoded = MessageValue::from_bytes(&desc, &bytes).unwrap();
    assert_eq!(decoded.get("x").unwrap(), Some(Value::I32(5)));
}

#[test]
fn test_merge_from_bytes() {
    let schema = every_kind_schema();
    let desc = schema.message("Everything").unwrap();

    let mut first = MessageValue::new(&desc);
    first.set("f_int32", Value::I32(1)).unwrap();
    first
        .set("f_repeated", Value::List(vec![Value::I32(1), Value::I32(2)]))
        .unwrap();

    let mut second = MessageValue::new(&desc);
    second.set("f_int32", Value::I32(7)).unwrap();
    second
        .set("f_repeated", Value::List(vec![Value::I32(3)]))
        .unwrap();

    // Concatenated payloads decode like one message: singular fields are
    // overwritten, repeated fields are concatenated.
    let mut bytes = first.to_bytes().unwrap();
    bytes.extend(second.to_bytes().unwrap());
    let decoded = MessageValue::from_bytes(&desc, &bytes).unwrap();

    assert_eq!(decoded.get("f_int32").unwrap(), Some(Value::I32(7)));
    assert_eq!(
        decoded.get("f_repeated").unwrap(),
        Some(Value::List(vec![
            Value::I32(1),
            Value::I32(2),
            Value::I32(3)
        ]))
    );
}

#[test]
fn test_nested_message_merge() {
    let mut builder = SchemaBuilder::new();
    let inner = builder.register_message("Inner", None).unwrap();
    builder
        .add_field(inner, FieldSpec::new("a", 1, Kind::Int32))
        .unwrap();
    builder
        .add_field(inner, FieldSpec::new("b", 2, Kind::Int32))
        .unwrap();
    let outer = builder.register_message("Outer", None).unwrap();
    builder
        .add_field(outer, FieldSpec::new("inner", 1, Kind::Message(inner)))
        .unwrap();
    let schema = builder.freeze().unwrap();

    let inner_desc = schema.message("Inner").unwrap();
    let outer_desc = schema.message("Outer").unwrap();

    // Two occurrences of the same singular message field merge: nested
    // singular fields are overwritten where both occurrences set them and
    // retained where only the first did.
    let mut first_inner = MessageValue::new(&inner_desc);
    first_inner.set("a", Value::I32(1)).unwrap();
    first_inner.set("b", Value::I32(2)).unwrap();
    let mut first = MessageValue::new(&outer_desc);
    first.set("inner", Value::Message(first_inner)).unwrap();

    let mut second_inner = MessageValue::new(&inner_desc);
    second_inner.set("b", Value::I32(9)).unwrap();
    let mut second = MessageValue::new(&outer_desc);
    second.set("inner", Value::Message(second_inner)).unwrap();

    let mut bytes = first.to_bytes().unwrap();
    bytes.extend(second.to_bytes().unwrap());
    let decoded = MessageValue::from_bytes(&outer_desc, &bytes).unwrap();

    let merged = match decoded.get("inner").unwrap() {
        Some(Value::Message(m)) => m,
        other => panic!("expected message, got {other:?}"),
    };
    assert_eq!(merged.get("a").unwrap(), Some(Value::I32(1)));
    assert_eq!(merged.get("b").unwrap(), Some(Value::I32(9)));
}

#[test]
fn test_truncated_payload_fails() {
    let schema = every_kind_schema();
    let desc = schema.message("Everything").unwrap();

    // String field key with a length prefix that overruns the buffer.
    let bytes = [0x72, 0x05, b'h', b'i'];
    let err = MessageValue::from_bytes(&desc, &bytes).unwrap_err();
    assert!(matches!(err, protox::DecodeError::Truncated { .. }));
}

#[test]
fn test_invalid_utf8_fails() {
    let schema = every_kind_schema();
    let desc = schema.message("Everything").unwrap();

    let bytes = [0x72, 0x03, 0xFF, 0xFE, 0xFD];
    let err = MessageValue::from_bytes(&desc, &bytes).unwrap_err();
    assert!(matches!(err, protox::DecodeError::InvalidUtf8 { .. }));
}
