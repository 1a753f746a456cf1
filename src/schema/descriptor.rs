//! Immutable descriptor pool and the views into it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::value::Value;
use crate::wire::WireType;

/// Handle to a message type registered with a
/// [`SchemaBuilder`](crate::SchemaBuilder).
///
/// Handles are stable from the moment of registration, which lets field
/// declarations reference message types whose own fields are not yet defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub(crate) u32);

/// Handle to an enum type registered with a
/// [`SchemaBuilder`](crate::SchemaBuilder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub(crate) u32);

/// The declared kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message(MessageId),
    Enum(EnumId),
}

impl Kind {
    /// The wire type a singular value of this kind is encoded with.
    pub fn wire_type(self) -> WireType {
        match self {
            Kind::Int32
            | Kind::Int64
            | Kind::Uint32
            | Kind::Uint64
            | Kind::Sint32
            | Kind::Sint64
            | Kind::Bool
            | Kind::Enum(_) => WireType::Varint,
            Kind::Fixed64 | Kind::Sfixed64 | Kind::Double => WireType::I64,
            Kind::Fixed32 | Kind::Sfixed32 | Kind::Float => WireType::I32,
            Kind::String | Kind::Bytes | Kind::Message(_) => WireType::Len,
        }
    }

    /// Whether repeated values of this kind may use the packed encoding.
    ///
    /// Everything but the length-delimited kinds packs.
    pub fn is_packable(self) -> bool {
        !matches!(self, Kind::String | Kind::Bytes | Kind::Message(_))
    }

    /// Whether this kind may key a map field.
    ///
    /// Integer kinds, bool, and string only; never float, bytes, enum, or
    /// message.
    pub fn is_valid_map_key(self) -> bool {
        matches!(
            self,
            Kind::Int32
                | Kind::Int64
                | Kind::Uint32
                | Kind::Uint64
                | Kind::Sint32
                | Kind::Sint64
                | Kind::Fixed32
                | Kind::Fixed64
                | Kind::Sfixed32
                | Kind::Sfixed64
                | Kind::Bool
                | Kind::String
        )
    }

    /// Short name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Double => "double",
            Kind::Float => "float",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Uint32 => "uint32",
            Kind::Uint64 => "uint64",
            Kind::Sint32 => "sint32",
            Kind::Sint64 => "sint64",
            Kind::Fixed32 => "fixed32",
            Kind::Fixed64 => "fixed64",
            Kind::Sfixed32 => "sfixed32",
            Kind::Sfixed64 => "sfixed64",
            Kind::Bool => "bool",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Message(_) => "message",
            Kind::Enum(_) => "enum",
        }
    }
}

/// How often a field may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one value.
    Singular,
    /// An ordered sequence of values.
    Repeated {
        /// Whether scalar elements are emitted as one length-delimited blob.
        packed: bool,
    },
    /// An associative container, encoded as repeated synthetic entries.
    Map,
}

pub(crate) struct FieldInner {
    pub(crate) name: String,
    pub(crate) tag: u32,
    pub(crate) kind: Kind,
    pub(crate) cardinality: Cardinality,
    pub(crate) default: Option<Value>,
    pub(crate) required: bool,
    pub(crate) oneof: Option<usize>,
}

pub(crate) struct OneofInner {
    pub(crate) name: String,
    /// Member field tags in declaration order.
    pub(crate) members: SmallVec<[u32; 4]>,
}

pub(crate) struct MessageInner {
    pub(crate) full_name: String,
    /// Ordered by tag, which is also the canonical encode order.
    pub(crate) fields: BTreeMap<u32, FieldInner>,
    pub(crate) field_names: HashMap<String, u32>,
    pub(crate) oneofs: Vec<OneofInner>,
    /// Synthetic two-field entry type backing a map field.
    pub(crate) map_entry: bool,
    /// Set once fields have been attached; a registered message whose fields
    /// were never defined can only carry the empty value.
    pub(crate) fields_defined: bool,
}

pub(crate) struct EnumInner {
    pub(crate) full_name: String,
    /// Declared `(symbol, number)` pairs in declaration order.
    pub(crate) values: Vec<(String, i32)>,
    pub(crate) by_name: HashMap<String, i32>,
    /// Index into `values` of the first symbol declared for a number.
    pub(crate) by_number: HashMap<i32, usize>,
}

pub(crate) struct SchemaInner {
    pub(crate) messages: Vec<MessageInner>,
    pub(crate) enums: Vec<EnumInner>,
    pub(crate) message_names: HashMap<String, MessageId>,
    pub(crate) enum_names: HashMap<String, EnumId>,
}

/// An immutable, shareable pool of frozen type descriptors.
///
/// Produced by [`SchemaBuilder::freeze`](crate::SchemaBuilder::freeze).
/// Cloning is cheap; concurrent reads are safe.
#[derive(Clone)]
pub struct Schema {
    pub(crate) inner: Arc<SchemaInner>,
}

impl Schema {
    /// Look up a message type by its full (dotted) name.
    pub fn message(&self, name: &str) -> Option<MessageDescriptor> {
        let id = *self.inner.message_names.get(name)?;
        Some(MessageDescriptor {
            schema: self.clone(),
            id,
        })
    }

    /// Look up an enum type by its full name.
    pub fn enum_type(&self, name: &str) -> Option<EnumDescriptor> {
        let id = *self.inner.enum_names.get(name)?;
        Some(EnumDescriptor {
            schema: self.clone(),
            id,
        })
    }

    /// Resolve a message handle obtained during schema construction.
    pub fn message_by_id(&self, id: MessageId) -> Option<MessageDescriptor> {
        if (id.0 as usize) < self.inner.messages.len() {
            Some(MessageDescriptor {
                schema: self.clone(),
                id,
            })
        } else {
            None
        }
    }

    /// Resolve an enum handle obtained during schema construction.
    pub fn enum_by_id(&self, id: EnumId) -> Option<EnumDescriptor> {
        if (id.0 as usize) < self.inner.enums.len() {
            Some(EnumDescriptor {
                schema: self.clone(),
                id,
            })
        } else {
            None
        }
    }

    pub(crate) fn message_inner(&self, id: MessageId) -> &MessageInner {
        &self.inner.messages[id.0 as usize]
    }

    pub(crate) fn enum_inner(&self, id: EnumId) -> &EnumInner {
        &self.inner.enums[id.0 as usize]
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("messages", &self.inner.messages.len())
            .field("enums", &self.inner.enums.len())
            .finish()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Schema {}

/// A message type within a frozen [`Schema`].
#[derive(Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub(crate) schema: Schema,
    pub(crate) id: MessageId,
}

impl MessageDescriptor {
    /// The full (dotted) name of this message type.
    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    /// The handle this message was registered under.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// The schema this descriptor belongs to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Whether fields have been attached to this message type.
    pub fn fields_defined(&self) -> bool {
        self.inner().fields_defined
    }

    /// Whether this is the synthetic entry type of a map field.
    pub fn is_map_entry(&self) -> bool {
        self.inner().map_entry
    }

    /// Fields in ascending tag order.
    pub fn fields(&self) -> impl Iterator<Item = FieldDescriptor> + '_ {
        self.inner().fields.keys().map(move |tag| FieldDescriptor {
            message: self.clone(),
            tag: *tag,
        })
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<FieldDescriptor> {
        let tag = *self.inner().field_names.get(name)?;
        Some(FieldDescriptor {
            message: self.clone(),
            tag,
        })
    }

    /// Look up a field by its field number.
    pub fn field_by_tag(&self, tag: u32) -> Option<FieldDescriptor> {
        if self.inner().fields.contains_key(&tag) {
            Some(FieldDescriptor {
                message: self.clone(),
                tag,
            })
        } else {
            None
        }
    }

    /// Names of the oneof groups declared on this message.
    pub fn oneof_names(&self) -> impl Iterator<Item = &str> {
        self.inner().oneofs.iter().map(|o| o.name.as_str())
    }

    /// Index of the named oneof group, if declared.
    pub(crate) fn oneof_index(&self, group: &str) -> Option<usize> {
        self.inner().oneofs.iter().position(|o| o.name == group)
    }

    pub(crate) fn inner(&self) -> &MessageInner {
        self.schema.message_inner(self.id)
    }
}

impl std::fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("full_name", &self.full_name())
            .finish()
    }
}

/// A single field of a [`MessageDescriptor`].
#[derive(Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub(crate) message: MessageDescriptor,
    pub(crate) tag: u32,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.inner().name
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn kind(&self) -> Kind {
        self.inner().kind
    }

    pub fn cardinality(&self) -> Cardinality {
        self.inner().cardinality
    }

    /// `proto2` required flag.
    pub fn required(&self) -> bool {
        self.inner().required
    }

    /// The declared default, if any. Defaults exist for scalar and enum
    /// kinds only and are never applied to oneof members.
    pub fn default_value(&self) -> Option<&Value> {
        self.inner().default.as_ref()
    }

    /// Name of the oneof group this field belongs to, if any.
    pub fn oneof_name(&self) -> Option<&str> {
        let idx = self.inner().oneof?;
        Some(self.message.inner().oneofs[idx].name.as_str())
    }

    pub(crate) fn oneof(&self) -> Option<usize> {
        self.inner().oneof
    }

    /// The message type of a message-kind field (for a map field, the
    /// synthetic entry type).
    pub fn message_type(&self) -> Option<MessageDescriptor> {
        match self.kind() {
            Kind::Message(id) => self.message.schema.message_by_id(id),
            _ => None,
        }
    }

    /// The enum type of an enum-kind field.
    pub fn enum_type(&self) -> Option<EnumDescriptor> {
        match self.kind() {
            Kind::Enum(id) => self.message.schema.enum_by_id(id),
            _ => None,
        }
    }

    /// Whether this field is a map.
    pub fn is_map(&self) -> bool {
        matches!(self.cardinality(), Cardinality::Map)
    }

    /// Key and value kinds of a map field, read from its entry type.
    pub fn map_kinds(&self) -> Option<(Kind, Kind)> {
        if !self.is_map() {
            return None;
        }
        let entry = self.message_type()?;
        let key = entry.field_by_tag(1)?.kind();
        let value = entry.field_by_tag(2)?.kind();
        Some((key, value))
    }

    pub(crate) fn inner(&self) -> &FieldInner {
        &self.message.inner().fields[&self.tag]
    }
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("message", &self.message.full_name())
            .field("name", &self.name())
            .field("tag", &self.tag)
            .finish()
    }
}

/// An enum type within a frozen [`Schema`].
#[derive(Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub(crate) schema: Schema,
    pub(crate) id: EnumId,
}

impl EnumDescriptor {
    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    pub fn id(&self) -> EnumId {
        self.id
    }

    /// Declared `(symbol, number)` pairs in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&str, i32)> {
        self.inner().values.iter().map(|(s, n)| (s.as_str(), *n))
    }

    /// The first symbol declared for `number`, if any.
    ///
    /// Unknown numbers are legal at the value layer; they simply have no
    /// symbol.
    pub fn symbol(&self, number: i32) -> Option<&str> {
        let idx = *self.inner().by_number.get(&number)?;
        Some(self.inner().values[idx].0.as_str())
    }

    /// The number declared for `symbol`, if any.
    pub fn number(&self, symbol: &str) -> Option<i32> {
        self.inner().by_name.get(symbol).copied()
    }

    pub(crate) fn inner(&self) -> &EnumInner {
        self.schema.enum_inner(self.id)
    }
}

impl std::fmt::Debug for EnumDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnumDescriptor")
            .field("full_name", &self.full_name())
            .finish()
    }
}
