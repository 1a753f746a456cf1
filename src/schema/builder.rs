//! Mutable schema construction with validation.

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::sync::Arc;

use smallvec::SmallVec;

use super::descriptor::{
    Cardinality, EnumId, EnumInner, FieldInner, Kind, MessageId, MessageInner, OneofInner, Schema,
    SchemaInner,
};
use crate::error::SchemaError;
use crate::value::Value;
use crate::wire::{MAX_TAG, MIN_TAG, RESERVED_TAG_END, RESERVED_TAG_START};

/// Declaration of a single field, fed to [`SchemaBuilder::add_field`] or
/// [`SchemaBuilder::define_fields`].
///
/// Construct with [`FieldSpec::new`] (or [`FieldSpec::map`]) and refine with
/// the builder-style modifiers:
///
/// ```
/// use protox::{FieldSpec, Kind, Value};
///
/// let spec = FieldSpec::new("score", 3, Kind::Int32)
///     .default_value(Value::I32(100));
/// let numbers = FieldSpec::new("numbers", 1, Kind::Int32).packed();
/// ```
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    tag: u32,
    kind: SpecKind,
    cardinality: Cardinality,
    required: bool,
    default: Option<Value>,
    oneof: Option<String>,
}

#[derive(Debug, Clone)]
enum SpecKind {
    Plain(Kind),
    Map { key: Kind, value: Kind },
}

impl FieldSpec {
    /// A singular field of the given kind.
    pub fn new(name: &str, tag: u32, kind: Kind) -> Self {
        FieldSpec {
            name: name.to_owned(),
            tag,
            kind: SpecKind::Plain(kind),
            cardinality: Cardinality::Singular,
            required: false,
            default: None,
            oneof: None,
        }
    }

    /// A map field. Key kinds are restricted to integer kinds, bool, and
    /// string; the builder rejects everything else.
    pub fn map(name: &str, tag: u32, key: Kind, value: Kind) -> Self {
        FieldSpec {
            name: name.to_owned(),
            tag,
            kind: SpecKind::Map { key, value },
            cardinality: Cardinality::Map,
            required: false,
            default: None,
            oneof: None,
        }
    }

    /// Mark the field repeated with per-element encoding.
    pub fn repeated(mut self) -> Self {
        self.cardinality = Cardinality::Repeated { packed: false };
        self
    }

    /// Mark the field repeated with the packed encoding.
    pub fn packed(mut self) -> Self {
        self.cardinality = Cardinality::Repeated { packed: true };
        self
    }

    /// Mark the field required (proto2 only).
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declare a default returned by `get` while the field is unset.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Place the field in the named oneof group. Groups are created on
    /// first use, in order of appearance.
    pub fn oneof(mut self, group: &str) -> Self {
        self.oneof = Some(group.to_owned());
        self
    }
}

/// Builder for a [`Schema`].
///
/// All validation happens as declarations come in; [`SchemaBuilder::freeze`]
/// hands out the immutable pool and rejects any further registration.
#[derive(Default)]
pub struct SchemaBuilder {
    messages: Vec<MessageInner>,
    enums: Vec<EnumInner>,
    message_names: HashMap<String, MessageId>,
    enum_names: HashMap<String, EnumId>,
    /// Per message: whether `define_fields` has been applied.
    sealed: Vec<bool>,
    frozen: bool,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder::default()
    }

    /// Register an enum type from `(symbol, number)` pairs.
    pub fn register_enum(
        &mut self,
        name: &str,
        values: &[(&str, i32)],
    ) -> Result<EnumId, SchemaError> {
        if self.frozen {
            return Err(SchemaError::Frozen);
        }
        if values.is_empty() {
            return Err(SchemaError::InvalidEnum {
                name: name.to_owned(),
                reason: "an enum must declare at least one value",
            });
        }
        self.check_type_name(name)?;

        let mut by_name = HashMap::with_capacity(values.len());
        let mut by_number = HashMap::with_capacity(values.len());
        for (idx, (symbol, number)) in values.iter().enumerate() {
            if by_name.insert((*symbol).to_owned(), *number).is_some() {
                return Err(SchemaError::InvalidEnum {
                    name: name.to_owned(),
                    reason: "duplicate symbol",
                });
            }
            // Aliased numbers are legal; the first symbol wins lookups.
            by_number.entry(*number).or_insert(idx);
        }

        let id = EnumId(self.enums.len() as u32);
        self.enums.push(EnumInner {
            full_name: name.to_owned(),
            values: values
                .iter()
                .map(|(s, n)| ((*s).to_owned(), *n))
                .collect(),
            by_name,
            by_number,
        });
        self.enum_names.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Register a message type with an empty field table.
    ///
    /// The returned handle is immediately usable in field declarations of
    /// other messages (or of this message itself), which is how recursive
    /// schemas are expressed. Attach the fields later with
    /// [`SchemaBuilder::add_field`] or [`SchemaBuilder::define_fields`].
    pub fn register_message(
        &mut self,
        name: &str,
        parent: Option<MessageId>,
    ) -> Result<MessageId, SchemaError> {
        if self.frozen {
            return Err(SchemaError::Frozen);
        }
        let full_name = match parent {
            None => name.to_owned(),
            Some(parent) => {
                let parent = self
                    .messages
                    .get(parent.0 as usize)
                    .ok_or(SchemaError::BadHandle)?;
                format!("{}.{}", parent.full_name, name)
            }
        };
        self.check_type_name(&full_name)?;
        Ok(self.push_message(full_name, false))
    }

    /// Add a single field to a message.
    pub fn add_field(&mut self, message: MessageId, spec: FieldSpec) -> Result<(), SchemaError> {
        if self.frozen {
            return Err(SchemaError::Frozen);
        }
        let idx = message.0 as usize;
        if idx >= self.messages.len() {
            return Err(SchemaError::BadHandle);
        }
        if self.sealed[idx] {
            return Err(SchemaError::FieldsAlreadyDefined {
                message: self.messages[idx].full_name.clone(),
            });
        }
        self.add_field_inner(message, spec)
    }

    /// Attach the full field list of a message in one deferred step.
    ///
    /// This is the second phase of recursive type construction. It applies
    /// at most once per message: a second call, or a call after
    /// [`SchemaBuilder::add_field`] has been used, is an error.
    pub fn define_fields(
        &mut self,
        message: MessageId,
        specs: Vec<FieldSpec>,
    ) -> Result<(), SchemaError> {
        if self.frozen {
            return Err(SchemaError::Frozen);
        }
        let idx = message.0 as usize;
        if idx >= self.messages.len() {
            return Err(SchemaError::BadHandle);
        }
        if self.sealed[idx] || !self.messages[idx].fields.is_empty() {
            return Err(SchemaError::FieldsAlreadyDefined {
                message: self.messages[idx].full_name.clone(),
            });
        }
        for spec in specs {
            self.add_field_inner(message, spec)?;
        }
        self.sealed[idx] = true;
        // An explicitly-defined empty field list is a complete (empty)
        // message type, not an incomplete one.
        self.messages[idx].fields_defined = true;
        Ok(())
    }

    /// Freeze the registry, producing the immutable [`Schema`].
    ///
    /// Every registration entry point fails with
    /// [`SchemaError::Frozen`] afterwards.
    pub fn freeze(&mut self) -> Result<Schema, SchemaError> {
        if self.frozen {
            return Err(SchemaError::Frozen);
        }
        self.frozen = true;
        Ok(Schema {
            inner: Arc::new(SchemaInner {
                messages: mem::take(&mut self.messages),
                enums: mem::take(&mut self.enums),
                message_names: mem::take(&mut self.message_names),
                enum_names: mem::take(&mut self.enum_names),
            }),
        })
    }

    fn push_message(&mut self, full_name: String, map_entry: bool) -> MessageId {
        let id = MessageId(self.messages.len() as u32);
        self.message_names.insert(full_name.clone(), id);
        self.messages.push(MessageInner {
            full_name,
            fields: BTreeMap::new(),
            field_names: HashMap::new(),
            oneofs: Vec::new(),
            map_entry,
            fields_defined: false,
        });
        self.sealed.push(false);
        id
    }

    fn check_type_name(&self, name: &str) -> Result<(), SchemaError> {
        if self.message_names.contains_key(name) || self.enum_names.contains_key(name) {
            return Err(SchemaError::DuplicateType {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn check_kind_handles(&self, kind: Kind) -> Result<(), SchemaError> {
        match kind {
            Kind::Message(id) if (id.0 as usize) >= self.messages.len() => {
                Err(SchemaError::BadHandle)
            }
            Kind::Enum(id) if (id.0 as usize) >= self.enums.len() => Err(SchemaError::BadHandle),
            _ => Ok(()),
        }
    }

    fn add_field_inner(&mut self, message: MessageId, spec: FieldSpec) -> Result<(), SchemaError> {
        let idx = message.0 as usize;
        let full_name = self.messages[idx].full_name.clone();

        if !(MIN_TAG..=MAX_TAG).contains(&spec.tag) {
            return Err(SchemaError::TagOutOfRange { tag: spec.tag });
        }
        if (RESERVED_TAG_START..=RESERVED_TAG_END).contains(&spec.tag) {
            return Err(SchemaError::ReservedTag { tag: spec.tag });
        }
        if self.messages[idx].fields.contains_key(&spec.tag) {
            return Err(SchemaError::TagConflict {
                message: full_name,
                tag: spec.tag,
            });
        }
        if self.messages[idx].field_names.contains_key(&spec.name) {
            return Err(SchemaError::NameConflict {
                message: full_name,
                name: spec.name,
            });
        }

        let invalid = |reason| {
            Err(SchemaError::InvalidField {
                field: format!("{}.{}", full_name, spec.name),
                reason,
            })
        };

        // Resolve the declared kind; a map materializes its synthetic
        // two-field entry type here.
        let kind = match spec.kind {
            SpecKind::Plain(kind) => {
                self.check_kind_handles(kind)?;
                kind
            }
            SpecKind::Map { key, value } => {
                if !key.is_valid_map_key() {
                    return Err(SchemaError::InvalidMapKey {
                        field: format!("{}.{}", full_name, spec.name),
                        kind: key.name(),
                    });
                }
                self.check_kind_handles(value)?;
                let entry_id = self.register_map_entry(&full_name, &spec.name, key, value)?;
                Kind::Message(entry_id)
            }
        };

        match spec.cardinality {
            Cardinality::Singular => {}
            Cardinality::Repeated { .. } | Cardinality::Map => {
                if spec.required {
                    return invalid("required is only valid on singular fields");
                }
                if spec.default.is_some() {
                    return invalid("defaults are only valid on singular fields");
                }
                if spec.oneof.is_some() {
                    return invalid("oneof members must be singular");
                }
            }
        }
        if let Cardinality::Repeated { packed: true } = spec.cardinality {
            if !kind.is_packable() {
                return invalid("packed repeated fields require a scalar or enum kind");
            }
        }

        let default = match spec.default {
            None => None,
            Some(value) => {
                if matches!(kind, Kind::Message(_)) {
                    return invalid("message fields cannot declare a default");
                }
                Some(self.canonicalize_default(&full_name, &spec.name, kind, value)?)
            }
        };

        let oneof = match &spec.oneof {
            None => None,
            Some(group) => {
                if spec.required {
                    return invalid("oneof members cannot be required");
                }
                let msg = &mut self.messages[idx];
                let group_idx = match msg.oneofs.iter().position(|o| &o.name == group) {
                    Some(group_idx) => group_idx,
                    None => {
                        msg.oneofs.push(OneofInner {
                            name: group.clone(),
                            members: SmallVec::new(),
                        });
                        msg.oneofs.len() - 1
                    }
                };
                msg.oneofs[group_idx].members.push(spec.tag);
                Some(group_idx)
            }
        };

        let msg = &mut self.messages[idx];
        msg.field_names.insert(spec.name.clone(), spec.tag);
        msg.fields.insert(
            spec.tag,
            FieldInner {
                name: spec.name,
                tag: spec.tag,
                kind,
                cardinality: spec.cardinality,
                default,
                required: spec.required,
                oneof,
            },
        );
        msg.fields_defined = true;
        Ok(())
    }

    /// Register the hidden `{key = 1, value = 2}` entry type of a map field.
    fn register_map_entry(
        &mut self,
        message_name: &str,
        field_name: &str,
        key: Kind,
        value: Kind,
    ) -> Result<MessageId, SchemaError> {
        let entry_name = format!("{}.{}Entry", message_name, upper_camel(field_name));
        self.check_type_name(&entry_name)?;
        let entry_id = self.push_message(entry_name, true);

        let entry = &mut self.messages[entry_id.0 as usize];
        for (tag, name, kind) in [(1u32, "key", key), (2u32, "value", value)] {
            entry.field_names.insert(name.to_owned(), tag);
            entry.fields.insert(
                tag,
                FieldInner {
                    name: name.to_owned(),
                    tag,
                    kind,
                    cardinality: Cardinality::Singular,
                    default: None,
                    required: false,
                    oneof: None,
                },
            );
        }
        entry.fields_defined = true;
        self.sealed[entry_id.0 as usize] = true;
        Ok(entry_id)
    }

    /// Range-check a declared default and store it in the canonical payload
    /// variant for the field's kind.
    fn canonicalize_default(
        &self,
        message_name: &str,
        field_name: &str,
        kind: Kind,
        value: Value,
    ) -> Result<Value, SchemaError> {
        let invalid = |reason| {
            Err(SchemaError::InvalidField {
                field: format!("{message_name}.{field_name}"),
                reason,
            })
        };

        let int_of = |value: &Value| -> Option<i128> {
            match value {
                Value::I32(v) => Some(i128::from(*v)),
                Value::I64(v) => Some(i128::from(*v)),
                Value::U32(v) => Some(i128::from(*v)),
                Value::U64(v) => Some(i128::from(*v)),
                _ => None,
            }
        };

        macro_rules! int_default {
            ($target:ty, $variant:ident) => {
                match int_of(&value) {
                    None => invalid("default value does not match the field's kind"),
                    Some(v) => match <$target>::try_from(v) {
                        Ok(v) => Ok(Value::$variant(v)),
                        Err(_) => invalid("default value does not fit the field's width"),
                    },
                }
            };
        }

        match kind {
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => int_default!(i32, I32),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => int_default!(i64, I64),
            Kind::Uint32 | Kind::Fixed32 => int_default!(u32, U32),
            Kind::Uint64 | Kind::Fixed64 => int_default!(u64, U64),
            Kind::Float => match value {
                Value::F32(v) => Ok(Value::F32(v)),
                Value::F64(v) => Ok(Value::F32(v as f32)),
                _ => invalid("default value does not match the field's kind"),
            },
            Kind::Double => match value {
                Value::F64(v) => Ok(Value::F64(v)),
                Value::F32(v) => Ok(Value::F64(f64::from(v))),
                _ => invalid("default value does not match the field's kind"),
            },
            Kind::Bool => match value {
                Value::Bool(v) => Ok(Value::Bool(v)),
                _ => invalid("default value does not match the field's kind"),
            },
            Kind::String => match value {
                Value::String(v) => Ok(Value::String(v)),
                _ => invalid("default value does not match the field's kind"),
            },
            Kind::Bytes => match value {
                Value::Bytes(v) => Ok(Value::Bytes(v)),
                _ => invalid("default value does not match the field's kind"),
            },
            Kind::Enum(id) => match value {
                Value::Enum(v) | Value::I32(v) => Ok(Value::Enum(v)),
                Value::String(symbol) => {
                    let declared = self.enums[id.0 as usize].by_name.get(&symbol);
                    match declared {
                        Some(number) => Ok(Value::Enum(*number)),
                        None => invalid("default symbol is not declared by the enum"),
                    }
                }
                _ => invalid("default value does not match the field's kind"),
            },
            // Rejected before canonicalization.
            Kind::Message(_) => invalid("message fields cannot declare a default"),
        }
    }
}

/// `numbers` -> `Numbers`, matching the reference implementation's synthetic
/// entry type naming.
fn upper_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
