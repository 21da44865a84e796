//! The document contract: typed mutation primitives plus change dispatch.
//!
//! Every backend implements the same operation table and dispatches changes
//! with identical shapes, so subscribers cannot tell which backend produced
//! an event. The tree-mutation bodies live here as shared functions; the
//! in-memory document delegates to them directly and the sharedb document
//! calls them after the wire round-trip, which is what keeps the two
//! backends bit-for-bit consistent.

use crate::change::Change;
use crate::sharedb::TransportError;
use crate::value::{kind_of, ValueKind};
use pathdoc_path::{Path, Step};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("path '{path}' does not address a {expected} value")]
    InvalidTarget { path: String, expected: ValueKind },
    #[error("index {index} does not exist at path '{path}'")]
    OutOfBounds { path: String, index: usize },
    #[error("local mutation discarded after version conflict; document resynced")]
    Conflict,
    #[error("malformed remote op")]
    MalformedOp,
    #[error("document '{0}' is not open")]
    NotOpen(String),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

pub type Callback = Box<dyn FnMut(Change) + Send + Sync>;

/// Path-scoped listener registry.
///
/// Listeners receive only the changes whose paths intersect their own, via
/// [`Change::project`]; dispatch is synchronous and runs every callback to
/// completion before the mutating call returns.
pub struct Subscribers {
    next_id: u64,
    entries: BTreeMap<u64, (Path, Callback)>,
}

impl Subscribers {
    pub fn new() -> Subscribers {
        Subscribers {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, path: Path, callback: Callback) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.entries.insert(id, (path, callback));
        id
    }

    /// Removes a registration; safe to call repeatedly.
    pub fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn dispatch(&mut self, change: &Change) {
        for (path, callback) in self.entries.values_mut() {
            if let Some(projected) = change.project(path) {
                callback(projected);
            }
        }
    }
}

impl Default for Subscribers {
    fn default() -> Subscribers {
        Subscribers::new()
    }
}

/// The backend contract.
///
/// Reads are total (`get` on a missing path is `None`, never an error).
/// Mutators assume key/index validity (the model layer's concern) and
/// dispatch exactly one change each, except when the mutation is a no-op
/// (removing a missing key, inserting nothing), which dispatches nothing
/// at all.
pub trait Document: Send {
    fn kind(&self, path: &Path) -> ValueKind;
    fn get(&self, path: &Path) -> Option<Value>;
    fn dict_keys(&self, path: &Path) -> Vec<String>;
    fn list_len(&self, path: &Path) -> usize;
    fn text_len(&self, path: &Path) -> usize;

    fn set_dict_item(&mut self, path: &Path, key: &str, value: Value)
        -> Result<(), DocumentError>;
    fn remove_dict_item(&mut self, path: &Path, key: &str) -> Result<(), DocumentError>;
    fn set_list_item(&mut self, path: &Path, index: usize, item: Value)
        -> Result<(), DocumentError>;
    fn insert_list_items(
        &mut self,
        path: &Path,
        index: usize,
        items: Vec<Value>,
    ) -> Result<(), DocumentError>;
    fn remove_list_items(
        &mut self,
        path: &Path,
        index: usize,
        count: usize,
    ) -> Result<(), DocumentError>;
    fn insert_text(&mut self, path: &Path, index: usize, text: &str)
        -> Result<(), DocumentError>;
    fn remove_text(&mut self, path: &Path, index: usize, count: usize)
        -> Result<(), DocumentError>;

    fn subscribe(&mut self, path: Path, callback: Callback) -> u64;
    fn unsubscribe(&mut self, id: u64) -> bool;
}

pub(crate) fn kind_at(tree: &Value, path: &Path) -> ValueKind {
    kind_of(path.lookup_ref(tree))
}

pub(crate) fn keys_at(tree: &Value, path: &Path) -> Vec<String> {
    match path.lookup_ref(tree) {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn list_len_at(tree: &Value, path: &Path) -> usize {
    match path.lookup_ref(tree) {
        Some(Value::Array(items)) => items.len(),
        _ => 0,
    }
}

pub(crate) fn text_len_at(tree: &Value, path: &Path) -> usize {
    match path.lookup_ref(tree) {
        Some(Value::String(text)) => text.chars().count(),
        _ => 0,
    }
}

pub(crate) fn node_mut<'a>(tree: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut current = tree;
    for step in path.steps() {
        current = match (step, current) {
            (Step::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (Step::Index(index), Value::Object(map)) => map.get_mut(&index.to_string())?,
            (step, Value::Array(items)) => items.get_mut(step.as_index()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub(crate) fn dict_at_mut<'a>(
    tree: &'a mut Value,
    path: &Path,
) -> Result<&'a mut Map<String, Value>, DocumentError> {
    match node_mut(tree, path) {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(DocumentError::InvalidTarget {
            path: path.to_string(),
            expected: ValueKind::Dict,
        }),
    }
}

pub(crate) fn list_at_mut<'a>(
    tree: &'a mut Value,
    path: &Path,
) -> Result<&'a mut Vec<Value>, DocumentError> {
    match node_mut(tree, path) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(DocumentError::InvalidTarget {
            path: path.to_string(),
            expected: ValueKind::List,
        }),
    }
}

pub(crate) fn text_at_mut<'a>(
    tree: &'a mut Value,
    path: &Path,
) -> Result<&'a mut String, DocumentError> {
    match node_mut(tree, path) {
        Some(Value::String(text)) => Ok(text),
        _ => Err(DocumentError::InvalidTarget {
            path: path.to_string(),
            expected: ValueKind::Text,
        }),
    }
}

/// Builds the change for one edit, tagging it with the current kind at
/// `path`, and fans it out.
pub(crate) fn dispatch_change(
    subscribers: &mut Subscribers,
    tree: &Value,
    path: &Path,
    key: Step,
    removed: Option<Value>,
    inserted: Option<Value>,
) {
    let kind = kind_of(path.lookup_ref(tree));
    subscribers.dispatch(&Change::new(path.clone(), key, kind, removed, inserted));
}

// Shared mutation bodies. These are the reference dispatch semantics.

pub(crate) fn apply_set_dict_item(
    tree: &mut Value,
    subscribers: &mut Subscribers,
    path: &Path,
    key: &str,
    value: Value,
) -> Result<(), DocumentError> {
    let map = dict_at_mut(tree, path)?;
    let removed = map.insert(key.to_string(), value.clone());
    dispatch_change(
        subscribers,
        tree,
        path,
        Step::Key(key.to_string()),
        removed,
        Some(value),
    );
    Ok(())
}

pub(crate) fn apply_remove_dict_item(
    tree: &mut Value,
    subscribers: &mut Subscribers,
    path: &Path,
    key: &str,
) -> Result<(), DocumentError> {
    let map = dict_at_mut(tree, path)?;
    let removed = map.remove(key);
    if let Some(removed) = removed {
        dispatch_change(
            subscribers,
            tree,
            path,
            Step::Key(key.to_string()),
            Some(removed),
            None,
        );
    }
    Ok(())
}

pub(crate) fn apply_set_list_item(
    tree: &mut Value,
    subscribers: &mut Subscribers,
    path: &Path,
    index: usize,
    item: Value,
) -> Result<(), DocumentError> {
    let list = list_at_mut(tree, path)?;
    let slot = list.get_mut(index).ok_or_else(|| DocumentError::OutOfBounds {
        path: path.to_string(),
        index,
    })?;
    let removed = std::mem::replace(slot, item.clone());
    dispatch_change(
        subscribers,
        tree,
        path,
        Step::Index(index),
        Some(Value::Array(vec![removed])),
        Some(Value::Array(vec![item])),
    );
    Ok(())
}

pub(crate) fn apply_insert_list_items(
    tree: &mut Value,
    subscribers: &mut Subscribers,
    path: &Path,
    index: usize,
    items: Vec<Value>,
) -> Result<(), DocumentError> {
    if items.is_empty() {
        return Ok(());
    }
    let list = list_at_mut(tree, path)?;
    let at = index.min(list.len());
    for (offset, item) in items.iter().enumerate() {
        list.insert(at + offset, item.clone());
    }
    dispatch_change(
        subscribers,
        tree,
        path,
        Step::Index(at),
        Some(Value::Array(Vec::new())),
        Some(Value::Array(items)),
    );
    Ok(())
}

pub(crate) fn apply_remove_list_items(
    tree: &mut Value,
    subscribers: &mut Subscribers,
    path: &Path,
    index: usize,
    count: usize,
) -> Result<(), DocumentError> {
    let list = list_at_mut(tree, path)?;
    let at = index.min(list.len());
    let end = (at + count).min(list.len());
    let removed: Vec<Value> = list.drain(at..end).collect();
    if removed.is_empty() {
        return Ok(());
    }
    dispatch_change(
        subscribers,
        tree,
        path,
        Step::Index(at),
        Some(Value::Array(removed)),
        Some(Value::Array(Vec::new())),
    );
    Ok(())
}

pub(crate) fn apply_insert_text(
    tree: &mut Value,
    subscribers: &mut Subscribers,
    path: &Path,
    index: usize,
    text: &str,
) -> Result<(), DocumentError> {
    if text.is_empty() {
        return Ok(());
    }
    let target = text_at_mut(tree, path)?;
    let mut chars: Vec<char> = target.chars().collect();
    let at = index.min(chars.len());
    for (offset, ch) in text.chars().enumerate() {
        chars.insert(at + offset, ch);
    }
    *target = chars.into_iter().collect();
    dispatch_change(
        subscribers,
        tree,
        path,
        Step::Index(at),
        Some(Value::String(String::new())),
        Some(Value::String(text.to_string())),
    );
    Ok(())
}

pub(crate) fn apply_remove_text(
    tree: &mut Value,
    subscribers: &mut Subscribers,
    path: &Path,
    index: usize,
    count: usize,
) -> Result<(), DocumentError> {
    let target = text_at_mut(tree, path)?;
    let mut chars: Vec<char> = target.chars().collect();
    let at = index.min(chars.len());
    let end = (at + count).min(chars.len());
    if at == end {
        return Ok(());
    }
    let removed: String = chars.drain(at..end).collect();
    *target = chars.into_iter().collect();
    dispatch_change(
        subscribers,
        tree,
        path,
        Step::Index(at),
        Some(Value::String(removed)),
        Some(Value::String(String::new())),
    );
    Ok(())
}
