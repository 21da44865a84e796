use pathdoc_core::change::Change;
use pathdoc_core::memory::MemoryDocument;
use pathdoc_core::model::{DocHandle, ModelError};
use pathdoc_core::registry::Registry;
use pathdoc_core::value::ValueKind;
use pathdoc_core::Path;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn handle(tree: serde_json::Value) -> Arc<DocHandle> {
    DocHandle::new(Box::new(MemoryDocument::new(tree)))
}

#[test]
fn models_are_cached_per_path() {
    let doc = handle(json!({"a": {"b": 1}}));
    let root = doc.model(Path::root());
    let a1 = root.get("a");
    let a2 = doc.model(Path::parse("a"));
    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(Arc::ptr_eq(&a1.get("b"), &root.at("a/b").unwrap()));
}

#[test]
fn navigation_is_total_and_relative() {
    let doc = handle(json!({"a": {"b": [5]}}));
    let b = doc.model(Path::parse("a/b"));
    assert_eq!(b.kind(), ValueKind::List);
    assert_eq!(b.get(0usize).value(), Some(json!(5)));
    assert_eq!(b.get(9usize).kind(), ValueKind::None);
    assert_eq!(b.at("../..").unwrap().path(), &Path::root());
    assert!(matches!(b.at("../../../x"), Err(ModelError::RootUnderflow)));
    assert_eq!(b.parent().unwrap().path(), &Path::parse("a"));
    assert!(doc.model(Path::root()).parent().is_none());
}

#[test]
fn values_are_validated_before_writing() {
    let doc = handle(json!({"d": {}, "l": [1]}));
    let d = doc.model(Path::parse("d"));
    assert!(matches!(d.set("k", json!(null)), Err(ModelError::InvalidValue)));
    let l = doc.model(Path::parse("l"));
    assert!(matches!(
        l.insert(0, vec![json!(1), json!(null)]),
        Err(ModelError::InvalidValue)
    ));
    // Nothing was written.
    assert_eq!(doc.model(Path::root()).value(), Some(json!({"d": {}, "l": [1]})));
}

#[test]
fn kind_mismatches_are_rejected_with_the_method_name() {
    let doc = handle(json!({"l": [1], "n": 3}));
    let err = doc.model(Path::parse("l")).keys().unwrap_err();
    assert_eq!(
        err.to_string(),
        "method 'keys' cannot be called on model type list"
    );
    assert!(matches!(
        doc.model(Path::parse("n")).size(),
        Err(ModelError::WrongKind { method: "size", .. })
    ));
    assert!(matches!(
        doc.model(Path::parse("missing")).set("k", json!(1)),
        Err(ModelError::WrongKind { kind: ValueKind::None, .. })
    ));
}

#[test]
fn negative_indices_count_from_the_end() {
    let doc = handle(json!({"l": [1, 2, 3], "s": "abc"}));
    let l = doc.model(Path::parse("l"));
    l.set_item(-1, json!(30)).unwrap();
    assert_eq!(l.value(), Some(json!([1, 2, 30])));
    l.insert(-1, vec![json!("mid")]).unwrap();
    assert_eq!(l.value(), Some(json!([1, 2, "mid", 30])));
    assert!(matches!(
        l.set_item(4, json!(0)),
        Err(ModelError::IndexOutOfRange { index: 4, size: 4 })
    ));

    let s = doc.model(Path::parse("s"));
    s.insert_text(3, "!").unwrap();
    assert_eq!(s.value(), Some(json!("abc!")));
    s.remove_text(-2, 2).unwrap();
    assert_eq!(s.value(), Some(json!("ab")));
}

#[test]
fn append_targets_the_end() {
    let doc = handle(json!({"l": [1], "s": "a"}));
    doc.model(Path::parse("l")).append(vec![json!(2), json!(3)]).unwrap();
    doc.model(Path::parse("s")).append_text("bc").unwrap();
    assert_eq!(
        doc.model(Path::root()).value(),
        Some(json!({"l": [1, 2, 3], "s": "abc"}))
    );
}

#[test]
fn remove_items_clamps_the_count() {
    let doc = handle(json!({"l": [1, 2, 3]}));
    doc.model(Path::parse("l")).remove_items(1, 99).unwrap();
    assert_eq!(doc.model(Path::parse("l")).value(), Some(json!([1])));
}

#[test]
fn set_value_emits_a_minimal_event_sequence() {
    let doc = handle(json!({"cfg": {"keep": 1, "change": 2}, "other": true}));
    let seen = Arc::new(Mutex::new(Vec::<Change>::new()));
    let sink = Arc::clone(&seen);
    let sub = doc
        .model(Path::root())
        .subscribe(move |change| sink.lock().unwrap().push(change));

    let cfg = doc.model(Path::parse("cfg"));
    cfg.set_value(&json!({"keep": 1, "change": 2})).unwrap();
    assert!(seen.lock().unwrap().is_empty());

    cfg.set_value(&json!({"keep": 1, "change": 20, "fresh": 3}))
        .unwrap();
    {
        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].inserted, Some(json!(20)));
        assert_eq!(events[1].inserted, Some(json!(3)));
    }
    assert_eq!(
        cfg.value(),
        Some(json!({"keep": 1, "change": 20, "fresh": 3}))
    );

    assert!(sub.cancel());
    assert!(!sub.cancel());
}

#[test]
fn set_value_kind_change_is_one_slot_set() {
    let doc = handle(json!({"cfg": {"a": 1}}));
    let cfg = doc.model(Path::parse("cfg"));
    cfg.set_value(&json!([1, 2])).unwrap();
    assert_eq!(cfg.value(), Some(json!([1, 2])));

    assert!(matches!(
        doc.model(Path::root()).set_value(&json!([])),
        Err(ModelError::RootReplace)
    ));
}

#[test]
fn registry_resolves_memory_urls_idempotently() {
    let mut registry = Registry::new();
    let m1 = registry.resolve("memory://local/doc1/a").unwrap();
    let m2 = registry.resolve("memory://local/doc1/a").unwrap();
    assert!(Arc::ptr_eq(&m1, &m2));

    let root = registry.resolve("memory://local/doc1").unwrap();
    root.set("a", json!({"x": 1})).unwrap();
    assert_eq!(m1.value(), Some(json!({"x": 1})));

    // A different document id is a different tree.
    let other = registry.resolve("memory://local/doc2").unwrap();
    assert_eq!(other.value(), Some(json!({})));
}

#[test]
fn registry_rejects_bad_urls() {
    let mut registry = Registry::new();
    assert!(matches!(
        registry.resolve("gopher://h/d"),
        Err(ModelError::UnknownProtocol(_))
    ));
    assert!(matches!(
        registry.resolve("memory://hostonly"),
        Err(ModelError::InvalidUrl(_))
    ));
    assert!(matches!(
        registry.resolve("sharedb://h/d"),
        Err(ModelError::NoTransport)
    ));
}

#[test]
fn disconnect_forgets_the_store() {
    let mut registry = Registry::new();
    let before = registry.resolve("memory://local/doc1").unwrap();
    before.set("a", json!(1)).unwrap();

    assert!(registry.disconnect("memory://local"));
    assert!(!registry.disconnect("memory://local"));

    // The old model keeps its document alive; a fresh resolve starts over.
    assert_eq!(before.value(), Some(json!({"a": 1})));
    let after = registry.resolve("memory://local/doc1").unwrap();
    assert_eq!(after.value(), Some(json!({})));
}
