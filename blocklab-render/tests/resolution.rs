//! Render cache and source stack behaviour seen through the engine

mod common;

use async_trait::async_trait;
use blocklab_core::ids::StatePrefix;
use blocklab_core::{BlockError, Config, LocaleMatch, LoadingState};
use blocklab_render::{ContentLoader, Engine, MemoryLoader, Origin, Renderable, Rendered};
use blocklab_types::{ContentId, ContentNode, IdMap, LocaleCode, ParsedContent, SourceName};
use common::*;
use futures::channel::oneshot;
use std::cell::RefCell;
use std::sync::Arc;
use std::task::Poll;

/// Drive until `id` at `prefix` settles and return the value
fn settle(engine: &Engine, id: &str, prefix: &StatePrefix) -> Result<Rendered, BlockError> {
    let id = ContentId::from(id);
    match engine.drive(|| engine.resolve_id(&id, prefix).read()).unwrap() {
        Poll::Ready(result) => result,
        Poll::Pending => panic!("resolution of {id} did not settle"),
    }
}

#[test]
fn test_lower_priority_source_serves_missing_id() {
    let engine = engine();
    dispatch_content(&engine, [md("greeting", "Hello")]);

    let rendered = settle(&engine, "greeting", &StatePrefix::root()).unwrap();
    let node = rendered.as_node().unwrap();
    assert_eq!(node.node.kids, md("greeting", "Hello").kids);
    assert!(matches!(
        &node.origin,
        Origin::Store { source, matched: LocaleMatch::Exact, .. } if *source == SourceName::content()
    ));
}

#[test]
fn test_higher_priority_source_wins() {
    let engine = engine();
    dispatch_content(&engine, [md("a", "content")]);
    engine.dispatch(&SourceName::inline(), id_map([md("a", "inline")]));

    let rendered = settle(&engine, "a", &StatePrefix::root()).unwrap();
    let node = rendered.as_node().unwrap();
    assert_eq!(node.node.kids, md("a", "inline").kids);
}

#[test]
fn test_same_key_same_future() {
    let engine = engine();
    dispatch_content(&engine, [md("x", "x")]);

    let first = engine.resolve_id(&"x".into(), &StatePrefix::root());
    let second = engine.resolve_id(&"x".into(), &StatePrefix::root());
    assert!(first.ptr_eq(&second));

    engine.run_until_stalled();
    let third = engine.resolve_id(&"x".into(), &StatePrefix::root());
    assert!(first.ptr_eq(&third));
    assert!(third.is_settled());
    assert!(engine.metrics().hits >= 2);
}

#[test]
fn test_kind_and_prefix_are_part_of_identity() {
    let engine = engine();
    dispatch_content(&engine, [md("x", "x")]);

    let by_ref = engine.resolve_id(&"x".into(), &StatePrefix::root());
    let nested = engine.resolve_id(&"x".into(), &StatePrefix::new("1"));
    let embedded = engine.resolve(&Renderable::Block(Arc::new(md("x", "x"))), &StatePrefix::root());

    assert!(!by_ref.ptr_eq(&nested));
    assert!(!by_ref.ptr_eq(&embedded));
    assert!(embedded.is_settled());
}

#[test]
fn test_nothing_resolves_to_one_sentinel() {
    let engine = engine();
    let a = engine.resolve(&Renderable::Nothing, &StatePrefix::root());
    let b = engine.resolve(&Renderable::from_option(None), &StatePrefix::new("3"));

    assert!(a.ptr_eq(&b));
    assert!(matches!(a.peek(), Some(Ok(Rendered::Empty))));
}

#[test]
fn test_prefixed_instances_share_content() {
    let engine = engine();
    dispatch_content(&engine, [md("item", "row")]);

    let plain = settle(&engine, "item", &StatePrefix::root()).unwrap();
    let listed = settle(&engine, "item", &StatePrefix::new("1")).unwrap();
    let (plain, listed) = (plain.as_node().unwrap(), listed.as_node().unwrap());

    assert_eq!(plain.key.as_str(), "item");
    assert_eq!(listed.key.as_str(), "1.item");
    assert!(Arc::ptr_eq(&plain.node, &listed.node));
}

#[test]
fn test_rejection_sticks_until_next_generation() {
    let engine = engine();
    let err = settle(&engine, "late", &StatePrefix::root()).unwrap_err();
    assert_eq!(err, BlockError::MissingContentId { id: "late".into() });

    let cached = engine.resolve_id(&"late".into(), &StatePrefix::root());
    assert!(cached.is_rejected());

    dispatch_content(&engine, [md("late", "here now")]);
    let fresh = engine.resolve_id(&"late".into(), &StatePrefix::root());
    assert!(!fresh.ptr_eq(&cached));
    assert!(settle(&engine, "late", &StatePrefix::root()).is_ok());
}

#[test]
fn test_validation_errors_reject() {
    let engine = engine();
    dispatch_content(
        &engine,
        [
            ContentNode::new("odd", "Mystery"),
            ContentNode::new("q", "TextInput").with_attribute("size", serde_json::json!("big")),
        ],
    );

    let err = settle(&engine, "odd", &StatePrefix::root()).unwrap_err();
    assert_eq!(err.name(), "UnknownBlockType");
    let err = settle(&engine, "q", &StatePrefix::root()).unwrap_err();
    assert_eq!(err.name(), "AttributeValidationError");
}

#[test]
fn test_loading_entry_waits_for_dispatch() {
    let engine = engine();
    engine.store().mark_loading(&SourceName::content(), &"slow".into());

    let id = ContentId::from("slow");
    let poll = engine.drive(|| engine.resolve_id(&id, &StatePrefix::root()).read()).unwrap();
    assert!(poll.is_pending());

    dispatch_content(&engine, [md("slow", "finally")]);
    assert!(settle(&engine, "slow", &StatePrefix::root()).is_ok());
}

#[test]
fn test_error_entry_rejects_with_load_failure() {
    let engine = engine();
    engine
        .store()
        .mark_error(&SourceName::content(), &"broken".into(), "502 from content server");

    let err = settle(&engine, "broken", &StatePrefix::root()).unwrap_err();
    assert_eq!(
        err,
        BlockError::LoadFailed {
            id: "broken".into(),
            source_name: SourceName::content(),
            message: "502 from content server".into(),
        }
    );
}

#[test]
fn test_locale_selection_and_fallback() {
    let engine = engine();
    let map = IdMap::new()
        .with_node(en(), md("hello", "Hello"))
        .with_node("es".into(), md("hello", "Hola").generated());
    engine.dispatch(&SourceName::content(), map);

    engine.set_locale("es-MX".into());
    let es = settle(&engine, "hello", &StatePrefix::root()).unwrap();
    assert_eq!(es.as_node().unwrap().node.kids, md("hello", "Hola").kids);
    assert!(es.as_node().unwrap().is_fallback());

    engine.set_locale("fr".into());
    let fr = engine.lookup(&"hello".into()).unwrap();
    assert_eq!(fr.locale, en());
    assert_eq!(fr.matched, LocaleMatch::Default);

    let tiers = engine.language_tiers();
    assert_eq!(tiers.curated, vec![en()]);
    assert_eq!(tiers.best_effort, vec![LocaleCode::new("es")]);
}

#[test]
fn test_dispatched_content_round_trips() {
    let engine = engine();
    let nodes = [
        md("intro", "Welcome"),
        vertical("unit", &["intro", "q1"]),
        ContentNode::new("q1", "TextInput").with_attribute("size", serde_json::json!(4)),
    ];
    let map = id_map(nodes);
    engine.dispatch(&SourceName::content(), map.clone());

    for (id, variants) in map.iter() {
        for (locale, node) in variants.iter() {
            engine.set_locale(locale.clone());
            let found = engine.lookup(id).unwrap();
            assert_eq!(&found.node, node);
            assert_eq!(&found.locale, locale);
        }
    }
}

#[test]
fn test_loader_fetches_missing_ids() {
    let document = ParsedContent {
        root: "remote".into(),
        id_map: id_map([vertical("remote", &["remote-text"]), md("remote-text", "fetched")]),
    };
    let engine = Engine::builder(Config::default())
        .loader(MemoryLoader::new().with_document(document))
        .build()
        .unwrap();
    register_all(&engine);

    let mounted = ready(engine.mount(&"remote".into()).unwrap());
    assert_eq!(mounted.text(), "fetched");
    assert!(mounted.errors().is_empty());

    let entry = engine
        .store()
        .snapshot()
        .entry(&SourceName::content(), &"remote".into())
        .cloned()
        .unwrap();
    assert_eq!(entry.state, LoadingState::Ready);
}

#[test]
fn test_loader_failure_is_recorded() {
    let engine = Engine::builder(Config::default())
        .loader(MemoryLoader::new())
        .build()
        .unwrap();
    register_all(&engine);

    let err = settle(&engine, "nowhere", &StatePrefix::root()).unwrap_err();
    assert_eq!(err.name(), "LoadFailed");
    let entry = engine
        .store()
        .snapshot()
        .entry(&SourceName::content(), &"nowhere".into())
        .cloned()
        .unwrap();
    assert_eq!(entry.state, LoadingState::Error);
}

struct GatedLoader {
    gate: RefCell<Option<oneshot::Receiver<ParsedContent>>>,
}

#[async_trait(?Send)]
impl ContentLoader for GatedLoader {
    async fn load(&self, id: &ContentId) -> Result<ParsedContent, BlockError> {
        let gate = self.gate.borrow_mut().take();
        match gate {
            Some(gate) => gate.await.map_err(|_| BlockError::LoadFailed {
                id: id.clone(),
                source_name: SourceName::content(),
                message: "gate dropped".into(),
            }),
            None => Err(BlockError::MissingContentId { id: id.clone() }),
        }
    }
}

#[test]
fn test_mount_suspends_until_loader_delivers() {
    let (open, gate) = oneshot::channel();
    let engine = Engine::builder(Config::default())
        .loader(GatedLoader {
            gate: RefCell::new(Some(gate)),
        })
        .build()
        .unwrap();
    register_all(&engine);

    let root = ContentId::from("lesson");
    assert!(engine.mount(&root).unwrap().is_pending());
    assert!(engine.mount(&root).unwrap().is_pending());

    open.send(ParsedContent {
        root: root.clone(),
        id_map: id_map([vertical("lesson", &["body"]), md("body", "unlocked")]),
    })
    .unwrap();

    let mounted = ready(engine.mount(&root).unwrap());
    assert_eq!(mounted.text(), "unlocked");
}
