//! Dynamic runtime for Google's Protocol Buffers, aka [protobuf](https://protobuf.dev).
//!
//! Message types are described at runtime through a [`SchemaBuilder`], frozen
//! into an immutable [`Schema`], and exercised through [`MessageValue`]s that
//! encode to and decode from the canonical protobuf wire format.
//!
//! ```
//! use protox::{FieldSpec, Kind, MessageValue, SchemaBuilder, Value};
//!
//! let mut builder = SchemaBuilder::new();
//! let point = builder.register_message("Point", None).unwrap();
//! builder.add_field(point, FieldSpec::new("x", 1, Kind::Int32)).unwrap();
//! builder.add_field(point, FieldSpec::new("y", 2, Kind::Int32)).unwrap();
//! let schema = builder.freeze().unwrap();
//!
//! let desc = schema.message("Point").unwrap();
//! let mut value = MessageValue::new(&desc);
//! value.set("x", Value::I32(1)).unwrap();
//!
//! let bytes = value.to_bytes().unwrap();
//! assert_eq!(bytes, [0x08, 0x01]);
//! assert_eq!(MessageValue::from_bytes(&desc, &bytes).unwrap(), value);
//! ```

mod codec;

pub mod error;
pub mod leb128;
pub mod schema;
pub mod value;
pub mod wire;

pub use error::{DecodeError, EncodeError, SchemaError, ValueError};
pub use schema::{
    Cardinality, EnumDescriptor, EnumId, FieldDescriptor, FieldSpec, Kind, MessageDescriptor,
    MessageId, Schema, SchemaBuilder,
};
pub use value::{DecodeOptions, MapKey, MessageValue, UnknownField, Value};
