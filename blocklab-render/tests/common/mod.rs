#![allow(dead_code)]

use blocklab_core::{AttrKind, AttrSpec, AttributeSchema, BlockDescriptor, Config, FieldSpec, Repeat, Scope};
use blocklab_render::{Engine, Mounted};
use blocklab_types::{ContentNode, IdMap, Kid, LocaleCode, SourceName};
use std::task::Poll;

pub fn block_types() -> Vec<BlockDescriptor> {
    vec![
        BlockDescriptor::new("Vertical"),
        BlockDescriptor::new("Markdown"),
        BlockDescriptor::new("TextInput")
            .field(FieldSpec::new("value", Scope::Component))
            .schema(AttributeSchema::new().attribute("size", AttrSpec::new(AttrKind::Integer)))
            .input(),
        BlockDescriptor::new("Check")
            .field(FieldSpec::new("correct", Scope::Component))
            .grader(),
        BlockDescriptor::new("List")
            .schema(AttributeSchema::new().attribute("count", AttrSpec::new(AttrKind::Integer).required()))
            .repeat(Repeat::Count {
                attribute: "count".into(),
            }),
        BlockDescriptor::new("Practice")
            .field(FieldSpec::new("attempt", Scope::Component))
            .repeat(Repeat::Attempts {
                field: "attempt".into(),
            }),
    ]
}

/// Engine with the default config and the test block types registered
pub fn engine() -> Engine {
    blocklab_core::init_tracing(false);
    let engine = Engine::new(Config::default()).unwrap();
    register_all(&engine);
    engine
}

pub fn register_all(engine: &Engine) {
    for descriptor in block_types() {
        engine.register(descriptor).unwrap();
    }
}

pub fn en() -> LocaleCode {
    LocaleCode::new("en")
}

pub fn md(id: &str, text: &str) -> ContentNode {
    ContentNode::new(id, "Markdown").with_kid(Kid::text(text))
}

pub fn vertical(id: &str, kids: &[&str]) -> ContentNode {
    ContentNode::new(id, "Vertical").with_kids(kids.iter().map(|k| Kid::reference(*k)))
}

/// English id map of `nodes`
pub fn id_map(nodes: impl IntoIterator<Item = ContentNode>) -> IdMap {
    let mut map = IdMap::new();
    for node in nodes {
        map.insert_node(en(), node);
    }
    map
}

pub fn dispatch_content(engine: &Engine, nodes: impl IntoIterator<Item = ContentNode>) {
    engine.dispatch(&SourceName::content(), id_map(nodes));
}

pub fn ready(poll: Poll<Mounted>) -> Mounted {
    match poll {
        Poll::Ready(mounted) => mounted,
        Poll::Pending => panic!("mount is still pending"),
    }
}
