//! Message values: mutable bindings of a descriptor to field payloads.

use core::fmt;

use bytes::Bytes;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::{DecodeError, EncodeError, ValueError};
use crate::schema::{Cardinality, FieldDescriptor, Kind, MessageDescriptor};
use crate::wire::WireType;

/// A field payload.
///
/// Integer payloads are stored in the canonical variant for the field's
/// declared kind (`I32` for `int32`/`sint32`/`sfixed32`, `U32` for
/// `uint32`/`fixed32`, and so on); the setters coerce wider inputs with a
/// range check.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    /// An enum number. Numbers without a declared symbol are preserved.
    Enum(i32),
    Message(MessageValue),
    /// Payload of a repeated field, in element order.
    List(Vec<Value>),
    /// Payload of a map field. Insertion-ordered so a single encode call
    /// sees a stable order; the order itself is not part of the API.
    Map(IndexMap<MapKey, Value>),
}

impl Value {
    /// Short payload-shape name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// The zero value of a scalar or enum kind.
    ///
    /// Used to backfill absent map-entry slots; message kinds have no scalar
    /// zero and are handled by the decoder.
    pub(crate) fn zero_of(kind: Kind) -> Value {
        match kind {
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Value::I32(0),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Value::I64(0),
            Kind::Uint32 | Kind::Fixed32 => Value::U32(0),
            Kind::Uint64 | Kind::Fixed64 => Value::U64(0),
            Kind::Float => Value::F32(0.0),
            Kind::Double => Value::F64(0.0),
            Kind::Bool => Value::Bool(false),
            Kind::String => Value::String(String::new()),
            Kind::Bytes => Value::Bytes(Bytes::new()),
            Kind::Enum(_) => Value::Enum(0),
            Kind::Message(_) => Value::List(Vec::new()),
        }
    }
}

/// A map-field key. Restricted to the kinds protobuf allows as map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    String(String),
}

impl MapKey {
    pub(crate) fn zero_of(kind: Kind) -> MapKey {
        match kind {
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => MapKey::I32(0),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => MapKey::I64(0),
            Kind::Uint32 | Kind::Fixed32 => MapKey::U32(0),
            Kind::Uint64 | Kind::Fixed64 => MapKey::U64(0),
            Kind::Bool => MapKey::Bool(false),
            // Map keys are validated at schema build time; string is the
            // only remaining kind.
            _ => MapKey::String(String::new()),
        }
    }

    /// The equivalent scalar payload, used when a key travels over the wire.
    pub(crate) fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(v) => Value::Bool(*v),
            MapKey::I32(v) => Value::I32(*v),
            MapKey::I64(v) => Value::I64(*v),
            MapKey::U32(v) => Value::U32(*v),
            MapKey::U64(v) => Value::U64(*v),
            MapKey::String(v) => Value::String(v.clone()),
        }
    }
}

/// A decoded field whose tag is not in the active descriptor.
///
/// Preserved in decode order and re-emitted verbatim after all known fields
/// so that decode/encode round-trips are byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    pub tag: u32,
    pub wire_type: WireType,
    /// The raw payload bytes, including the length prefix for
    /// length-delimited values.
    pub data: Bytes,
}

/// Options for [`MessageValue::from_bytes_with`].
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Verify required-field presence once the payload is exhausted.
    ///
    /// Disabling this mirrors the tolerant mode of the reference runtimes:
    /// structural wire errors stay terminal, only the completion check is
    /// skipped.
    pub check_required: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            check_required: true,
        }
    }
}

/// A mutable message value bound to a [`MessageDescriptor`].
///
/// Field slots are keyed by tag; an absent slot is the `UNSET` state, which
/// is observable through [`MessageValue::has`] and distinct from a slot
/// holding the zero value of its kind.
#[derive(Clone)]
pub struct MessageValue {
    pub(crate) desc: MessageDescriptor,
    pub(crate) fields: std::collections::BTreeMap<u32, Value>,
    /// Per oneof group: the tag of the currently-set member.
    pub(crate) oneof_active: Vec<Option<u32>>,
    pub(crate) unknown: SmallVec<[UnknownField; 2]>,
}

impl MessageValue {
    /// Create an empty value of the given message type.
    pub fn new(desc: &MessageDescriptor) -> MessageValue {
        MessageValue {
            desc: desc.clone(),
            fields: std::collections::BTreeMap::new(),
            oneof_active: vec![None; desc.inner().oneofs.len()],
            unknown: SmallVec::new(),
        }
    }

    /// The descriptor this value is bound to.
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.desc
    }

    /// Set a field, coercing the payload to the field's declared kind.
    ///
    /// Setting a member of a oneof group clears every other member of the
    /// group.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ValueError> {
        let field = self.field(name)?;
        let coerced = coerce(&field, value)?;
        let (tag, oneof) = (field.tag(), field.oneof());
        self.set_slot(tag, oneof, coerced);
        Ok(())
    }

    /// Read a field.
    ///
    /// Returns the stored payload; for an unset field, the declared default
    /// of a singular scalar (never an invented zero), an empty container
    /// for repeated and map fields, and `None` for unset message fields and
    /// unset oneof members (defaults are not applied to oneof members).
    pub fn get(&self, name: &str) -> Result<Option<Value>, ValueError> {
        let field = self.field(name)?;
        if let Some(value) = self.fields.get(&field.tag()) {
            return Ok(Some(value.clone()));
        }
        if field.oneof().is_some() {
            return Ok(None);
        }
        Ok(match field.cardinality() {
            Cardinality::Repeated { .. } => Some(Value::List(Vec::new())),
            Cardinality::Map => Some(Value::Map(IndexMap::new())),
            Cardinality::Singular => field.default_value().cloned(),
        })
    }

    /// Whether a field is present.
    ///
    /// Repeated and map fields are present iff non-empty; there is no
    /// observable distinction between unset and empty for them.
    pub fn has(&self, name: &str) -> Result<bool, ValueError> {
        let field = self.field(name)?;
        Ok(match self.fields.get(&field.tag()) {
            None => false,
            Some(Value::List(items)) => !items.is_empty(),
            Some(Value::Map(map)) => !map.is_empty(),
            Some(_) => true,
        })
    }

    /// Reset a field to the unset state.
    pub fn clear(&mut self, name: &str) -> Result<(), ValueError> {
        let field = self.field(name)?;
        let (tag, oneof) = (field.tag(), field.oneof());
        self.fields.remove(&tag);
        if let Some(group) = oneof {
            if self.oneof_active[group] == Some(tag) {
                self.oneof_active[group] = None;
            }
        }
        Ok(())
    }

    /// Name of the currently-set member of a oneof group, if any.
    pub fn which_oneof(&self, group: &str) -> Result<Option<&str>, ValueError> {
        let idx = self
            .desc
            .oneof_index(group)
            .ok_or_else(|| ValueError::NoSuchOneof {
                message: self.desc.full_name().to_owned(),
                group: group.to_owned(),
            })?;
        Ok(self.oneof_active[idx]
            .map(|tag| self.desc.inner().fields[&tag].name.as_str()))
    }

    /// True iff no field slot is set and no unknown fields are held.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown.is_empty()
    }

    /// True iff every required field is set.
    pub fn is_initialized(&self) -> bool {
        self.desc
            .inner()
            .fields
            .values()
            .all(|f| !f.required || self.fields.contains_key(&f.tag))
    }

    /// Declared field names in tag order.
    pub fn field_names(&self) -> Vec<&str> {
        self.desc
            .inner()
            .fields
            .values()
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Unknown fields captured by the last decode, in decode order.
    pub fn unknown_fields(&self) -> &[UnknownField] {
        &self.unknown
    }

    /// Encode to the canonical wire representation.
    ///
    /// Fails if a required field is unset or the descriptor's fields were
    /// never defined (and the value is non-empty).
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let len = crate::codec::encoded_message_len(self)?;
        let mut buf = Vec::with_capacity(len);
        crate::codec::encode_message(self, &mut buf)?;
        debug_assert_eq!(buf.len(), len);
        Ok(buf)
    }

    /// Decode a payload with default options (required fields enforced).
    pub fn from_bytes(desc: &MessageDescriptor, data: &[u8]) -> Result<MessageValue, DecodeError> {
        Self::from_bytes_with(desc, data, DecodeOptions::default())
    }

    /// Decode a payload.
    pub fn from_bytes_with(
        desc: &MessageDescriptor,
        data: &[u8],
        options: DecodeOptions,
    ) -> Result<MessageValue, DecodeError> {
        let mut value = MessageValue::new(desc);
        value.merge_from_bytes(data)?;
        if options.check_required {
            crate::codec::check_required(&value)?;
        }
        Ok(value)
    }

    /// Decode a payload into this value, following protobuf merge
    /// semantics: singular fields are overwritten, repeated fields are
    /// appended, nested messages merge recursively.
    ///
    /// The required-field completion check is not applied here; it runs in
    /// [`MessageValue::from_bytes`] once the outermost payload is consumed.
    pub fn merge_from_bytes(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        crate::codec::decode_into(self, data)
    }

    /// Debugging projection into a nested associative structure.
    ///
    /// Set fields only. Enum numbers render as their declared symbol when
    /// one exists; bytes render as a number array; non-finite floats render
    /// as strings. Not a wire-relevant mapping.
    pub fn to_dict(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (tag, value) in &self.fields {
            // Slots are only created for declared fields.
            if let Some(field) = self.desc.field_by_tag(*tag) {
                out.insert(field.name().to_owned(), value_to_json(&field, value));
            }
        }
        serde_json::Value::Object(out)
    }

    fn field(&self, name: &str) -> Result<FieldDescriptor, ValueError> {
        self.desc.field(name).ok_or_else(|| ValueError::NoSuchField {
            message: self.desc.full_name().to_owned(),
            field: name.to_owned(),
        })
    }

    /// Store a payload, applying the oneof exclusivity rule. Shared by the
    /// setters and the decoder.
    pub(crate) fn set_slot(&mut self, tag: u32, oneof: Option<usize>, value: Value) {
        if let Some(group) = oneof {
            let members = self.desc.inner().oneofs[group].members.clone();
            for member in members {
                if member != tag {
                    self.fields.remove(&member);
                }
            }
            self.oneof_active[group] = Some(tag);
        }
        self.fields.insert(tag, value);
    }

    /// Append one decoded element to a repeated field's slot.
    pub(crate) fn push_repeated(&mut self, tag: u32, item: Value) {
        let slot = self
            .fields
            .entry(tag)
            .or_insert_with(|| Value::List(Vec::new()));
        if let Value::List(items) = slot {
            items.push(item);
        } else {
            *slot = Value::List(vec![item]);
        }
    }

    /// Insert one decoded entry into a map field's slot; later duplicate
    /// keys overwrite earlier ones.
    pub(crate) fn insert_map_entry(&mut self, tag: u32, key: MapKey, item: Value) {
        let slot = self
            .fields
            .entry(tag)
            .or_insert_with(|| Value::Map(IndexMap::new()));
        if let Value::Map(map) = slot {
            map.insert(key, item);
        } else {
            let mut map = IndexMap::new();
            map.insert(key, item);
            *slot = Value::Map(map);
        }
    }
}

impl PartialEq for MessageValue {
    /// Two values are equal iff they share a descriptor and every field is
    /// either unset in both or holds equal payloads in both. An empty
    /// repeated or map slot is indistinguishable from an unset one.
    fn eq(&self, other: &Self) -> bool {
        fn normalize(value: Option<&Value>) -> Option<&Value> {
            match value {
                Some(Value::List(items)) if items.is_empty() => None,
                Some(Value::Map(map)) if map.is_empty() => None,
                other => other,
            }
        }

        if self.desc != other.desc || self.unknown != other.unknown {
            return false;
        }
        self.fields
            .keys()
            .chain(other.fields.keys())
            .all(|tag| normalize(self.fields.get(tag)) == normalize(other.fields.get(tag)))
    }
}

impl fmt::Debug for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageValue")
            .field("type", &self.desc.full_name())
            .field("fields", &self.fields)
            .field("unknown", &self.unknown.len())
            .finish()
    }
}

impl fmt::Display for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_message(self, f, 0)
    }
}

const DISPLAY_INDENT: usize = 4;

fn fmt_message(value: &MessageValue, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
    writeln!(f, "message {} {{", value.desc.full_name())?;
    let pad = (level + 1) * DISPLAY_INDENT;
    for (tag, payload) in &value.fields {
        if let Some(field) = value.desc.field_by_tag(*tag) {
            write!(f, "{:pad$}{} = ", "", field.name())?;
            fmt_value(&field, payload, f, level + 1)?;
            writeln!(f)?;
        }
    }
    write!(f, "{:pad$}}}", "", pad = level * DISPLAY_INDENT)
}

fn fmt_value(
    field: &FieldDescriptor,
    value: &Value,
    f: &mut fmt::Formatter<'_>,
    level: usize,
) -> fmt::Result {
    match value {
        Value::Bool(v) => write!(f, "{v}"),
        Value::I32(v) => write!(f, "{v}"),
        Value::I64(v) => write!(f, "{v}"),
        Value::U32(v) => write!(f, "{v}"),
        Value::U64(v) => write!(f, "{v}"),
        Value::F32(v) => write!(f, "{v}"),
        Value::F64(v) => write!(f, "{v}"),
        Value::String(v) => write!(f, "{v:?}"),
        Value::Bytes(v) => write!(f, "{v:?}"),
        Value::Enum(number) => {
            match field.enum_type().and_then(|e| e.symbol(*number).map(str::to_owned)) {
                Some(symbol) => write!(f, "{symbol}"),
                None => write!(f, "{number}"),
            }
        }
        Value::Message(m) => fmt_message(m, f, level),
        Value::List(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_value(field, item, f, level)?;
            }
            write!(f, "]")
        }
        Value::Map(map) => {
            let value_field = field.message_type().and_then(|e| e.field_by_tag(2));
            write!(f, "{{")?;
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match key {
                    MapKey::String(k) => write!(f, "{k:?}: ")?,
                    MapKey::Bool(k) => write!(f, "{k}: ")?,
                    MapKey::I32(k) => write!(f, "{k}: ")?,
                    MapKey::I64(k) => write!(f, "{k}: ")?,
                    MapKey::U32(k) => write!(f, "{k}: ")?,
                    MapKey::U64(k) => write!(f, "{k}: ")?,
                }
                match &value_field {
                    Some(value_field) => fmt_value(value_field, item, f, level)?,
                    None => write!(f, "?")?,
                }
            }
            write!(f, "}}")
        }
    }
}

fn json_f64(v: f64) -> serde_json::Value {
    match serde_json::Number::from_f64(v) {
        Some(number) => serde_json::Value::Number(number),
        // NaN and infinities have no JSON number form.
        None => serde_json::Value::String(v.to_string()),
    }
}

fn value_to_json(field: &FieldDescriptor, value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(v) => serde_json::Value::Bool(*v),
        Value::I32(v) => serde_json::Value::from(*v),
        Value::I64(v) => serde_json::Value::from(*v),
        Value::U32(v) => serde_json::Value::from(*v),
        Value::U64(v) => serde_json::Value::from(*v),
        Value::F32(v) => json_f64(f64::from(*v)),
        Value::F64(v) => json_f64(*v),
        Value::String(v) => serde_json::Value::String(v.clone()),
        Value::Bytes(v) => serde_json::Value::Array(
            v.iter().map(|b| serde_json::Value::from(*b)).collect(),
        ),
        Value::Enum(number) => {
            match field.enum_type().and_then(|e| e.symbol(*number).map(str::to_owned)) {
                Some(symbol) => serde_json::Value::String(symbol),
                None => serde_json::Value::from(*number),
            }
        }
        Value::Message(m) => m.to_dict(),
        Value::List(items) => serde_json::Value::Array(
            items.iter().map(|item| value_to_json(field, item)).collect(),
        ),
        Value::Map(map) => {
            let value_field = field.message_type().and_then(|e| e.field_by_tag(2));
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                let key = match key {
                    MapKey::Bool(k) => k.to_string(),
                    MapKey::I32(k) => k.to_string(),
                    MapKey::I64(k) => k.to_string(),
                    MapKey::U32(k) => k.to_string(),
                    MapKey::U64(k) => k.to_string(),
                    MapKey::String(k) => k.clone(),
                };
                let item = match &value_field {
                    Some(value_field) => value_to_json(value_field, item),
                    None => serde_json::Value::Null,
                };
                out.insert(key, item);
            }
            serde_json::Value::Object(out)
        }
    }
}

fn wrong_kind(field: &FieldDescriptor, expected: &'static str, actual: &Value) -> ValueError {
    ValueError::WrongKind {
        field: field.name().to_owned(),
        expected,
        actual: actual.kind_name(),
    }
}

/// Coerce a payload to a field's declared kind and cardinality.
fn coerce(field: &FieldDescriptor, value: Value) -> Result<Value, ValueError> {
    match field.cardinality() {
        Cardinality::Singular => coerce_single(field, field.kind(), value),
        Cardinality::Repeated { .. } => match value {
            Value::List(items) => {
                let items = items
                    .into_iter()
                    .map(|item| coerce_single(field, field.kind(), item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(items))
            }
            other => Err(wrong_kind(field, "list", &other)),
        },
        Cardinality::Map => match value {
            Value::Map(map) => {
                let (key_kind, value_kind) = match field.map_kinds() {
                    Some(kinds) => kinds,
                    None => return Err(wrong_kind(field, "map", &Value::Map(map))),
                };
                let mut out = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    let key = coerce_map_key(field, key_kind, key)?;
                    let item = coerce_single(field, value_kind, item)?;
                    out.insert(key, item);
                }
                Ok(Value::Map(out))
            }
            other => Err(wrong_kind(field, "map", &other)),
        },
    }
}

fn int_payload(value: &Value) -> Option<i128> {
    match value {
        Value::I32(v) => Some(i128::from(*v)),
        Value::I64(v) => Some(i128::from(*v)),
        Value::U32(v) => Some(i128::from(*v)),
        Value::U64(v) => Some(i128::from(*v)),
        _ => None,
    }
}

/// Coerce a single element to the given kind; `field` supplies the error
/// context and the schema for message/enum resolution.
fn coerce_single(field: &FieldDescriptor, kind: Kind, value: Value) -> Result<Value, ValueError> {
    macro_rules! int_value {
        ($target:ty, $variant:ident, $expected:literal) => {
            match int_payload(&value) {
                None => Err(wrong_kind(field, $expected, &value)),
                Some(v) => <$target>::try_from(v).map(Value::$variant).map_err(|_| {
                    ValueError::OutOfRange {
                        field: field.name().to_owned(),
                        value: v,
                    }
                }),
            }
        };
    }

    match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => int_value!(i32, I32, "i32"),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => int_value!(i64, I64, "i64"),
        Kind::Uint32 | Kind::Fixed32 => int_value!(u32, U32, "u32"),
        Kind::Uint64 | Kind::Fixed64 => int_value!(u64, U64, "u64"),
        Kind::Float => match &value {
            Value::F32(v) => Ok(Value::F32(*v)),
            Value::F64(v) => Ok(Value::F32(*v as f32)),
            _ => match int_payload(&value) {
                Some(v) => Ok(Value::F32(v as f32)),
                None => Err(wrong_kind(field, "f32", &value)),
            },
        },
        Kind::Double => match &value {
            Value::F64(v) => Ok(Value::F64(*v)),
            Value::F32(v) => Ok(Value::F64(f64::from(*v))),
            _ => match int_payload(&value) {
                Some(v) => Ok(Value::F64(v as f64)),
                None => Err(wrong_kind(field, "f64", &value)),
            },
        },
        Kind::Bool => match value {
            Value::Bool(v) => Ok(Value::Bool(v)),
            other => Err(wrong_kind(field, "bool", &other)),
        },
        Kind::String => match value {
            Value::String(v) => Ok(Value::String(v)),
            other => Err(wrong_kind(field, "string", &other)),
        },
        Kind::Bytes => match value {
            Value::Bytes(v) => Ok(Value::Bytes(v)),
            other => Err(wrong_kind(field, "bytes", &other)),
        },
        Kind::Enum(id) => match value {
            // Numbers are stored as-is: unknown enum numbers are legal and
            // preserved.
            Value::Enum(v) | Value::I32(v) => Ok(Value::Enum(v)),
            Value::String(symbol) => {
                let number = field
                    .message
                    .schema()
                    .enum_by_id(id)
                    .and_then(|e| e.number(&symbol));
                match number {
                    Some(number) => Ok(Value::Enum(number)),
                    None => Err(ValueError::InvalidEnumSymbol {
                        field: field.name().to_owned(),
                        symbol,
                    }),
                }
            }
            other => match int_payload(&other) {
                Some(v) => i32::try_from(v).map(Value::Enum).map_err(|_| {
                    ValueError::OutOfRange {
                        field: field.name().to_owned(),
                        value: v,
                    }
                }),
                None => Err(wrong_kind(field, "enum", &other)),
            },
        },
        Kind::Message(id) => match value {
            Value::Message(m) => {
                let expected = field.message.schema().message_by_id(id);
                match expected {
                    Some(expected) if *m.descriptor() == expected => Ok(Value::Message(m)),
                    Some(expected) => Err(ValueError::DescriptorMismatch {
                        field: field.name().to_owned(),
                        expected: expected.full_name().to_owned(),
                        actual: m.descriptor().full_name().to_owned(),
                    }),
                    None => Err(ValueError::DescriptorMismatch {
                        field: field.name().to_owned(),
                        expected: String::new(),
                        actual: m.descriptor().full_name().to_owned(),
                    }),
                }
            }
            other => Err(wrong_kind(field, "message", &other)),
        },
    }
}

fn coerce_map_key(field: &FieldDescriptor, kind: Kind, key: MapKey) -> Result<MapKey, ValueError> {
    let int_of = |key: &MapKey| -> Option<i128> {
        match key {
            MapKey::I32(v) => Some(i128::from(*v)),
            MapKey::I64(v) => Some(i128::from(*v)),
            MapKey::U32(v) => Some(i128::from(*v)),
            MapKey::U64(v) => Some(i128::from(*v)),
            _ => None,
        }
    };

    macro_rules! int_key {
        ($target:ty, $variant:ident) => {
            match int_of(&key) {
                None => Err(ValueError::WrongKind {
                    field: field.name().to_owned(),
                    expected: "integer map key",
                    actual: "map key",
                }),
                Some(v) => <$target>::try_from(v).map(MapKey::$variant).map_err(|_| {
                    ValueError::OutOfRange {
                        field: field.name().to_owned(),
                        value: v,
                    }
                }),
            }
        };
    }

    match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => int_key!(i32, I32),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => int_key!(i64, I64),
        Kind::Uint32 | Kind::Fixed32 => int_key!(u32, U32),
        Kind::Uint64 | Kind::Fixed64 => int_key!(u64, U64),
        Kind::Bool => match key {
            MapKey::Bool(v) => Ok(MapKey::Bool(v)),
            _ => Err(ValueError::WrongKind {
                field: field.name().to_owned(),
                expected: "bool map key",
                actual: "map key",
            }),
        },
        // Build-time validation leaves string as the only other key kind.
        _ => match key {
            MapKey::String(v) => Ok(MapKey::String(v)),
            _ => Err(ValueError::WrongKind {
                field: field.name().to_owned(),
                expected: "string map key",
                actual: "map key",
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, Kind, SchemaBuilder};

    fn simple_schema() -> crate::schema::Schema {
        let mut builder = SchemaBuilder::new();
        let color = builder
            .register_enum("Color", &[("RED", 0), ("GREEN", 1), ("BLUE", 2)])
            .unwrap();
        let msg = builder.register_message("Widget", None).unwrap();
        builder
            .add_field(msg, FieldSpec::new("count", 1, Kind::Int32))
            .unwrap();
        builder
            .add_field(
                msg,
                FieldSpec::new("score", 2, Kind::Int32).default_value(Value::I32(123)),
            )
            .unwrap();
        builder
            .add_field(msg, FieldSpec::new("name", 3, Kind::String))
            .unwrap();
        builder
            .add_field(msg, FieldSpec::new("color", 4, Kind::Enum(color)))
            .unwrap();
        builder
            .add_field(msg, FieldSpec::new("ids", 5, Kind::Uint32).repeated())
            .unwrap();
        builder.freeze().unwrap()
    }

    #[test]
    fn test_presence_and_defaults() {
        let schema = simple_schema();
        let desc = schema.message("Widget").unwrap();
        let mut value = MessageValue::new(&desc);

        // Unset scalar without a declared default reads as absent.
        assert_eq!(value.get("count").unwrap(), None);
        // Declared default is visible without marking the field present.
        assert_eq!(value.get("score").unwrap(), Some(Value::I32(123)));
        assert!(!value.has("score").unwrap());

        value.set("count", Value::I32(0)).unwrap();
        assert!(value.has("count").unwrap());
        assert_eq!(value.get("count").unwrap(), Some(Value::I32(0)));

        value.clear("count").unwrap();
        assert!(!value.has("count").unwrap());
    }

    #[test]
    fn test_repeated_defaults_to_empty() {
        let schema = simple_schema();
        let desc = schema.message("Widget").unwrap();
        let mut value = MessageValue::new(&desc);

        assert_eq!(value.get("ids").unwrap(), Some(Value::List(Vec::new())));
        assert!(!value.has("ids").unwrap());

        value
            .set("ids", Value::List(vec![Value::U32(1), Value::U32(2)]))
            .unwrap();
        assert!(value.has("ids").unwrap());

        // An explicitly empty list still reads as not-present.
        value.set("ids", Value::List(Vec::new())).unwrap();
        assert!(!value.has("ids").unwrap());
    }

    #[test]
    fn test_integer_coercion_and_range() {
        let schema = simple_schema();
        let desc = schema.message("Widget").unwrap();
        let mut value = MessageValue::new(&desc);

        // Wider integer payloads are accepted when in range.
        value.set("count", Value::I64(41)).unwrap();
        assert_eq!(value.get("count").unwrap(), Some(Value::I32(41)));

        let err = value.set("count", Value::I64(i64::from(i32::MAX) + 1)).unwrap_err();
        assert!(matches!(err, ValueError::OutOfRange { .. }));

        let err = value.set("name", Value::I32(1)).unwrap_err();
        assert!(matches!(err, ValueError::WrongKind { .. }));

        let err = value.set("missing", Value::I32(1)).unwrap_err();
        assert!(matches!(err, ValueError::NoSuchField { .. }));
    }

    #[test]
    fn test_enum_symbol_coercion() {
        let schema = simple_schema();
        let desc = schema.message("Widget").unwrap();
        let mut value = MessageValue::new(&desc);

        value.set("color", Value::String("BLUE".to_owned())).unwrap();
        assert_eq!(value.get("color").unwrap(), Some(Value::Enum(2)));

        // Unknown numbers are stored untouched.
        value.set("color", Value::I32(77)).unwrap();
        assert_eq!(value.get("color").unwrap(), Some(Value::Enum(77)));

        let err = value
            .set("color", Value::String("MAGENTA".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ValueError::InvalidEnumSymbol { .. }));
    }

    #[test]
    fn test_equality_ignores_empty_containers() {
        let schema = simple_schema();
        let desc = schema.message("Widget").unwrap();

        let mut a = MessageValue::new(&desc);
        let b = MessageValue::new(&desc);
        a.set("ids", Value::List(Vec::new())).unwrap();
        assert_eq!(a, b);

        a.set("count", Value::I32(1)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_to_dict() {
        let schema = simple_schema();
        let desc = schema.message("Widget").unwrap();
        let mut value = MessageValue::new(&desc);
        value.set("count", Value::I32(7)).unwrap();
        value.set("color", Value::Enum(1)).unwrap();
        value.set("name", Value::String("gizmo".to_owned())).unwrap();

        let dict = value.to_dict();
        assert_eq!(dict["count"], serde_json::json!(7));
        assert_eq!(dict["color"], serde_json::json!("GREEN"));
        assert_eq!(dict["name"], serde_json::json!("gizmo"));
        // Unset fields stay absent, defaults included.
        assert!(dict.get("score").is_none());
    }
}
