//! Recursive and mutually-referential schemas via deferred field binding.

use protox::{FieldSpec, Kind, MessageValue, Schema, SchemaBuilder, Value};

/// `Tree { int32 value = 1; Tree left = 2; Tree right = 3; }`
fn tree_schema() -> Schema {
    let mut builder = SchemaBuilder::new();
    let tree = builder.register_message("Tree", None).unwrap();
    builder
        .define_fields(
            tree,
            vec![
                FieldSpec::new("value", 1, Kind::Int32),
                FieldSpec::new("left", 2, Kind::Message(tree)),
                FieldSpec::new("right", 3, Kind::Message(tree)),
            ],
        )
        .unwrap();
    builder.freeze().unwrap()
}

fn leaf(desc: &protox::MessageDescriptor, value: i32) -> MessageValue {
    let mut node = MessageValue::new(desc);
    node.set("value", Value::I32(value)).unwrap();
    node
}

#[test]
fn test_self_referential_field() {
    let schema = tree_schema();
    let desc = schema.message("Tree").unwrap();

    let field = desc.field("left").unwrap();
    assert_eq!(field.message_type().unwrap(), desc);
}

#[test]
fn test_deep_tree_roundtrip() {
    let schema = tree_schema();
    let desc = schema.message("Tree").unwrap();

    // A left-leaning chain of depth 64.
    let mut root = leaf(&desc, 0);
    for value in 1..64 {
        let mut node = leaf(&desc, value);
        node.set("left", Value::Message(root)).unwrap();
        root = node;
    }

    let bytes = root.to_bytes().unwrap();
    let decoded = MessageValue::from_bytes(&desc, &bytes).unwrap();
    assert_eq!(decoded, root);

    // Walk down and verify the chain survived.
    let mut depth = 0;
    let mut cursor = decoded;
    loop {
        match cursor.get("left").unwrap() {
            Some(Value::Message(next)) => {
                depth += 1;
                cursor = next;
            }
            _ => break,
        }
    }
    assert_eq!(depth, 63);
    assert_eq!(cursor.get("value").unwrap(), Some(Value::I32(0)));
}

#[test]
fn test_branching_tree_roundtrip() {
    let schema = tree_schema();
    let desc = schema.message("Tree").unwrap();

    let mut root = leaf(&desc, 1);
    root.set("left", Value::Message(leaf(&desc, 2))).unwrap();
    root.set("right", Value::Message(leaf(&desc, 3))).unwrap();

    let bytes = root.to_bytes().unwrap();
    let decoded = MessageValue::from_bytes(&desc, &bytes).unwrap();
    assert_eq!(decoded, root);
}

#[test]
fn test_mutually_recursive_messages() {
    let mut builder = SchemaBuilder::new();
    let ping = builder.register_message("Ping", None).unwrap();
    let pong = builder.register_message("Pong", None).unwrap();
    builder
        .define_fields(
            ping,
            vec![
                FieldSpec::new("seq", 1, Kind::Uint32),
                FieldSpec::new("pong", 2, Kind::Message(pong)),
            ],
        )
        .unwrap();
    builder
        .define_fields(
            pong,
            vec![
                FieldSpec::new("seq", 1, Kind::Uint32),
                FieldSpec::new("ping", 2, Kind::Message(ping)),
            ],
        )
        .unwrap();
    let schema = builder.freeze().unwrap();

    let ping_desc = schema.message("Ping").unwrap();
    let pong_desc = schema.message("Pong").unwrap();

    let mut inner_ping = MessageValue::new(&ping_desc);
    inner_ping.set("seq", Value::U32(3)).unwrap();
    let mut pong_value = MessageValue::new(&pong_desc);
    pong_value.set("seq", Value::U32(2)).unwrap();
    pong_value.set("ping", Value::Message(inner_ping)).unwrap();
    let mut ping_value = MessageValue::new(&ping_desc);
    ping_value.set("seq", Value::U32(1)).unwrap();
    ping_value.set("pong", Value::Message(pong_value)).unwrap();

    let bytes = ping_value.to_bytes().unwrap();
    let decoded = MessageValue::from_bytes(&ping_desc, &bytes).unwrap();
    assert_eq!(decoded, ping_value);
}

#[test]
fn test_recursive_map_values() {
    // A map whose values recursively hold the same message type.
    let mut builder = SchemaBuilder::new();
    let node = builder.register_message("Node", None).unwrap();
    builder
        .define_fields(
            node,
            vec![
                FieldSpec::new("label", 1, Kind::String),
                FieldSpec::map("children", 2, Kind::String, Kind::Message(node)),
            ],
        )
        .unwrap();
    let schema = builder.freeze().unwrap();
    let desc = schema.message("Node").unwrap();

    let mut child = MessageValue::new(&desc);
    child.set("label", Value::String("leaf".to_owned())).unwrap();

    let mut root = MessageValue::new(&desc);
    root.set("label", Value::String("root".to_owned())).unwrap();
    let mut children = indexmap::IndexMap::new();
    children.insert(
        protox::MapKey::String("a".to_owned()),
        Value::Message(child),
    );
    root.set("children", Value::Map(children)).unwrap();

    let bytes = root.to_bytes().unwrap();
    let decoded = MessageValue::from_bytes(&desc, &bytes).unwrap();
    assert_eq!(decoded, root);
}
