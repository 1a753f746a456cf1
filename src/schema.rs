//! Schema model: runtime descriptors for message and enum types.
//!
//! Types are registered through a [`SchemaBuilder`], which validates field
//! numbers, names, oneof membership, and map key kinds as declarations come
//! in. [`SchemaBuilder::freeze`] produces an immutable [`Schema`] pool;
//! descriptor views ([`MessageDescriptor`], [`FieldDescriptor`],
//! [`EnumDescriptor`]) are cheap handles into that pool and safe to read from
//! any number of threads.
//!
//! Recursive and mutually-referential message types are handled with a
//! two-phase lifecycle: register the message first (obtaining a
//! [`MessageId`] other fields can reference), then attach its fields with
//! [`SchemaBuilder::define_fields`].

mod builder;
pub(crate) mod descriptor;

pub use builder::{FieldSpec, SchemaBuilder};
pub use descriptor::{
    Cardinality, EnumDescriptor, EnumId, FieldDescriptor, Kind, MessageDescriptor, MessageId,
    Schema,
};
