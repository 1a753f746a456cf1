//! Error types for the wire codec, schema construction, and value access.

use core::fmt;

use crate::wire::WireType;

/// Errors produced while decoding a protobuf payload.
///
/// Decode errors are terminal: no partial message value is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A varint ran past its maximum width or the buffer ended mid-varint.
    MalformedVarint,
    /// The buffer ended before a fixed-width or length-delimited value.
    Truncated { needed: usize, remaining: usize },
    /// A length prefix exceeds the platform's addressable memory.
    LengthOverflow { value: u64 },
    /// The low three bits of a field key held a value above 5.
    InvalidWireType { value: u8 },
    /// A field key carried a field number outside `1..=2^29-1`.
    TagOutOfRange { tag: u32 },
    /// The payload used the group encoding, deprecated by protobuf.
    GroupUnsupported,
    /// A known field arrived with an incompatible wire type.
    WireTypeMismatch {
        field: String,
        expected: WireType,
        actual: WireType,
    },
    /// A string field held invalid UTF-8.
    InvalidUtf8 { field: String },
    /// A decoded integer does not fit the field's declared width.
    OutOfRange { field: String },
    /// A required field was still unset once the payload was exhausted.
    MissingRequired { message: String, field: String },
    /// The message type was registered but its fields were never defined.
    SchemaIncomplete { message: String },
    /// An internal invariant was broken; the reason names it.
    ProgrammingError { reason: &'static str },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedVarint => {
                write!(f, "malformed varint")
            }
            DecodeError::Truncated { needed, remaining } => {
                write!(
                    f,
                    "unexpected end of buffer: needed {needed} bytes, {remaining} remaining"
                )
            }
            DecodeError::LengthOverflow { value } => {
                write!(f, "length prefix {value} exceeds addressable memory")
            }
            DecodeError::InvalidWireType { value } => {
                write!(f, "invalid 'wire type' value: {value}")
            }
            DecodeError::TagOutOfRange { tag } => {
                write!(f, "field number {tag} is out of range")
            }
            DecodeError::GroupUnsupported => {
                write!(f, "group encoding is not supported [deprecated by protobuf]")
            }
            DecodeError::WireTypeMismatch {
                field,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "field {field:?} declares wire type {expected:?}, read {actual:?} instead"
                )
            }
            DecodeError::InvalidUtf8 { field } => {
                write!(f, "invalid UTF-8 in string field {field:?}")
            }
            DecodeError::OutOfRange { field } => {
                write!(f, "decoded value does not fit the width of field {field:?}")
            }
            DecodeError::MissingRequired { message, field } => {
                write!(f, "message {message:?} is missing required field {field:?}")
            }
            DecodeError::SchemaIncomplete { message } => {
                write!(f, "fields of message {message:?} were never defined")
            }
            DecodeError::ProgrammingError { reason } => {
                write!(f, "programming error: '{reason}'")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors produced while encoding a message value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A required field was unset at encode time.
    MissingRequired { message: String, field: String },
    /// The message type was registered but its fields were never defined.
    SchemaIncomplete { message: String },
    /// A field slot held a payload that disagrees with its declared kind.
    ///
    /// Unreachable through the public API: `set` coerces and decode
    /// canonicalizes every payload before it lands in a slot.
    InvalidPayload { field: String },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::MissingRequired { message, field } => {
                write!(f, "message {message:?} is missing required field {field:?}")
            }
            EncodeError::SchemaIncomplete { message } => {
                write!(f, "fields of message {message:?} were never defined")
            }
            EncodeError::InvalidPayload { field } => {
                write!(f, "payload of field {field:?} disagrees with its declared kind")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Errors produced by [`SchemaBuilder`](crate::SchemaBuilder) validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The registry was frozen; no further registration is accepted.
    Frozen,
    /// A handle did not originate from this builder.
    BadHandle,
    /// Field number outside `1..=2^29-1`.
    TagOutOfRange { tag: u32 },
    /// Field number within the range `19000..=19999` reserved by protobuf.
    ReservedTag { tag: u32 },
    /// Two fields of one message share a field number.
    TagConflict { message: String, tag: u32 },
    /// Two fields of one message share a name.
    NameConflict { message: String, name: String },
    /// Two registered types share a full name.
    DuplicateType { name: String },
    /// A map key kind other than an integer kind, bool, or string.
    InvalidMapKey { field: String, kind: &'static str },
    /// A field declaration broke a structural rule; the reason names it.
    InvalidField { field: String, reason: &'static str },
    /// `define_fields` was applied to a message that already has fields.
    FieldsAlreadyDefined { message: String },
    /// An enum registration broke a structural rule.
    InvalidEnum { name: String, reason: &'static str },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Frozen => {
                write!(f, "schema registry is frozen")
            }
            SchemaError::BadHandle => {
                write!(f, "type handle does not belong to this builder")
            }
            SchemaError::TagOutOfRange { tag } => {
                write!(
                    f,
                    "field number {tag} is invalid, expected range [1..2^29-1]"
                )
            }
            SchemaError::ReservedTag { tag } => {
                write!(
                    f,
                    "field number {tag} lies in [19000..19999], reserved by protobuf"
                )
            }
            SchemaError::TagConflict { message, tag } => {
                write!(f, "field number {tag} is already used in message {message:?}")
            }
            SchemaError::NameConflict { message, name } => {
                write!(f, "field name {name:?} is already used in message {message:?}")
            }
            SchemaError::DuplicateType { name } => {
                write!(f, "a type named {name:?} is already registered")
            }
            SchemaError::InvalidMapKey { field, kind } => {
                write!(
                    f,
                    "map field {field:?} declares key kind {kind}, \
                     expected an integer kind, bool, or string"
                )
            }
            SchemaError::InvalidField { field, reason } => {
                write!(f, "invalid field {field:?}: {reason}")
            }
            SchemaError::FieldsAlreadyDefined { message } => {
                write!(f, "fields of message {message:?} are already defined")
            }
            SchemaError::InvalidEnum { name, reason } => {
                write!(f, "invalid enum {name:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Errors produced by the [`MessageValue`](crate::MessageValue) accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The message has no field with the given name.
    NoSuchField { message: String, field: String },
    /// The message has no oneof group with the given name.
    NoSuchOneof { message: String, group: String },
    /// The payload's kind disagrees with the field's declared kind.
    WrongKind {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    /// An integer payload does not fit the field's declared width.
    OutOfRange { field: String, value: i128 },
    /// A message payload was built against a different message type.
    DescriptorMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    /// An enum symbol that the enum type does not declare.
    InvalidEnumSymbol { field: String, symbol: String },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::NoSuchField { message, field } => {
                write!(f, "message {message:?} has no field {field:?}")
            }
            ValueError::NoSuchOneof { message, group } => {
                write!(f, "message {message:?} has no oneof group {group:?}")
            }
            ValueError::WrongKind {
                field,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "field {field:?} expects a value of kind {expected}, got {actual} instead"
                )
            }
            ValueError::OutOfRange { field, value } => {
                write!(f, "value {value} does not fit the width of field {field:?}")
            }
            ValueError::DescriptorMismatch {
                field,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "field {field:?} expects a {expected:?} message, got {actual:?} instead"
                )
            }
            ValueError::InvalidEnumSymbol { field, symbol } => {
                write!(f, "enum field {field:?} has no symbol {symbol:?}")
            }
        }
    }
}

impl std::error::Error for ValueError {}
