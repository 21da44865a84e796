//! Validated, path-navigable façade over a document.
//!
//! A [`DocHandle`] owns one backend and caches one [`Model`] per path, so
//! navigating to the same location twice yields the same `Arc`. Models
//! validate keys, indices, and values before touching the document; the
//! backend itself assumes validity.

use crate::change::Change;
use crate::diff::{diff_values, DiffOp};
use crate::document::{Document, DocumentError};
use crate::value::{is_valid_value, ValueKind};
use pathdoc_path::{Path, Step};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid value type")]
    InvalidValue,
    #[error("index {index} out of range for size {size}")]
    IndexOutOfRange { index: i64, size: usize },
    #[error("method '{method}' cannot be called on model type {kind}")]
    WrongKind {
        method: &'static str,
        kind: ValueKind,
    },
    #[error("relative path ascends above the document root")]
    RootUnderflow,
    #[error("the document root cannot be replaced with a different kind")]
    RootReplace,
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),
    #[error("invalid document url '{0}'")]
    InvalidUrl(String),
    #[error("no transport factory configured for remote stores")]
    NoTransport,
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// One open document plus its model cache.
pub struct DocHandle {
    doc: Mutex<Box<dyn Document>>,
    models: Mutex<HashMap<String, Arc<Model>>>,
}

impl DocHandle {
    pub fn new(doc: Box<dyn Document>) -> Arc<DocHandle> {
        Arc::new(DocHandle {
            doc: Mutex::new(doc),
            models: Mutex::new(HashMap::new()),
        })
    }

    /// The model for `path`, creating and caching it on first use.
    pub fn model(self: &Arc<Self>, path: Path) -> Arc<Model> {
        let mut models = self.models.lock().expect("model cache lock poisoned");
        let entry = models.entry(path.to_string()).or_insert_with(|| {
            Arc::new(Model {
                doc: Arc::clone(self),
                path,
            })
        });
        Arc::clone(entry)
    }

    fn doc(&self) -> std::sync::MutexGuard<'_, Box<dyn Document>> {
        self.doc.lock().expect("document lock poisoned")
    }
}

/// A view of one location in a document.
///
/// Reads are total: a model may address a location that does not exist yet,
/// in which case its kind is [`ValueKind::None`] and its value is `None`.
pub struct Model {
    doc: Arc<DocHandle>,
    path: Path,
}

/// An active subscription; cancel through [`SubscriptionHandle::cancel`].
pub struct SubscriptionHandle {
    doc: Arc<DocHandle>,
    id: u64,
}

impl SubscriptionHandle {
    /// Idempotent; returns whether the subscription was still active.
    pub fn cancel(&self) -> bool {
        self.doc.doc().unsubscribe(self.id)
    }
}

fn validate_value(value: &Value) -> Result<(), ModelError> {
    if is_valid_value(value) {
        Ok(())
    } else {
        Err(ModelError::InvalidValue)
    }
}

/// Maps a possibly negative index onto `0..size + overflow`.
///
/// Negative indices count back from the end; `overflow` is 1 for insertion
/// positions (one past the end is legal) and 0 for existing slots.
fn normalize_index(index: i64, size: usize, overflow: usize) -> Result<usize, ModelError> {
    let limit = (size + overflow) as i64;
    let normalized = if index < 0 { index + size as i64 } else { index };
    if normalized < 0 || normalized >= limit {
        return Err(ModelError::IndexOutOfRange { index, size });
    }
    Ok(normalized as usize)
}

fn apply_diff_op(doc: &mut dyn Document, op: DiffOp) -> Result<(), DocumentError> {
    match op {
        DiffOp::DictSet {
            path,
            key,
            inserted,
            ..
        } => doc.set_dict_item(&path, &key, inserted),
        DiffOp::DictRemove { path, key, .. } => doc.remove_dict_item(&path, &key),
        DiffOp::ListSet {
            path,
            index,
            inserted,
            ..
        } => doc.set_list_item(&path, index, inserted),
        DiffOp::ListInsert { path, index, items } => doc.insert_list_items(&path, index, items),
        DiffOp::ListRemove { path, index, items } => {
            doc.remove_list_items(&path, index, items.len())
        }
        DiffOp::TextInsert { path, index, text } => doc.insert_text(&path, index, &text),
        DiffOp::TextRemove { path, index, text } => {
            doc.remove_text(&path, index, text.chars().count())
        }
    }
}

impl Model {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ValueKind {
        self.doc.doc().kind(&self.path)
    }

    pub fn value(&self) -> Option<Value> {
        self.doc.doc().get(&self.path)
    }

    /// Dict keys, in document order.
    pub fn keys(&self) -> Result<Vec<String>, ModelError> {
        let doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::Dict => Ok(doc.dict_keys(&self.path)),
            kind => Err(ModelError::WrongKind {
                method: "keys",
                kind,
            }),
        }
    }

    /// Element count of a list, character count of a text.
    pub fn size(&self) -> Result<usize, ModelError> {
        let doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::List => Ok(doc.list_len(&self.path)),
            ValueKind::Text => Ok(doc.text_len(&self.path)),
            kind => Err(ModelError::WrongKind {
                method: "size",
                kind,
            }),
        }
    }

    /// The child model one step below this one. Total; the child may not
    /// exist in the document.
    pub fn get(&self, step: impl Into<Step>) -> Arc<Model> {
        self.doc.model(self.path.child(step))
    }

    /// The model at a relative path ('.' and '..' respected).
    pub fn at(&self, relative: &str) -> Result<Arc<Model>, ModelError> {
        let path = self.path.join(relative).ok_or(ModelError::RootUnderflow)?;
        Ok(self.doc.model(path))
    }

    /// The enclosing model, or `None` at the root.
    pub fn parent(&self) -> Option<Arc<Model>> {
        Some(self.doc.model(self.path.parent()?))
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), ModelError> {
        validate_value(&value)?;
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::Dict => Ok(doc.set_dict_item(&self.path, key, value)?),
            kind => Err(ModelError::WrongKind { method: "set", kind }),
        }
    }

    pub fn remove(&self, key: &str) -> Result<(), ModelError> {
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::Dict => Ok(doc.remove_dict_item(&self.path, key)?),
            kind => Err(ModelError::WrongKind {
                method: "remove",
                kind,
            }),
        }
    }

    pub fn set_item(&self, index: i64, item: Value) -> Result<(), ModelError> {
        validate_value(&item)?;
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::List => {
                let index = normalize_index(index, doc.list_len(&self.path), 0)?;
                Ok(doc.set_list_item(&self.path, index, item)?)
            }
            kind => Err(ModelError::WrongKind {
                method: "set_item",
                kind,
            }),
        }
    }

    pub fn insert(&self, index: i64, items: Vec<Value>) -> Result<(), ModelError> {
        for item in &items {
            validate_value(item)?;
        }
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::List => {
                let index = normalize_index(index, doc.list_len(&self.path), 1)?;
                Ok(doc.insert_list_items(&self.path, index, items)?)
            }
            kind => Err(ModelError::WrongKind {
                method: "insert",
                kind,
            }),
        }
    }

    pub fn append(&self, items: Vec<Value>) -> Result<(), ModelError> {
        for item in &items {
            validate_value(item)?;
        }
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::List => {
                let end = doc.list_len(&self.path);
                Ok(doc.insert_list_items(&self.path, end, items)?)
            }
            kind => Err(ModelError::WrongKind {
                method: "append",
                kind,
            }),
        }
    }

    pub fn remove_items(&self, index: i64, count: usize) -> Result<(), ModelError> {
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::List => {
                let size = doc.list_len(&self.path);
                let index = normalize_index(index, size, 0)?;
                let count = count.min(size - index);
                Ok(doc.remove_list_items(&self.path, index, count)?)
            }
            kind => Err(ModelError::WrongKind {
                method: "remove_items",
                kind,
            }),
        }
    }

    pub fn insert_text(&self, index: i64, text: &str) -> Result<(), ModelError> {
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::Text => {
                let index = normalize_index(index, doc.text_len(&self.path), 1)?;
                Ok(doc.insert_text(&self.path, index, text)?)
            }
            kind => Err(ModelError::WrongKind {
                method: "insert_text",
                kind,
            }),
        }
    }

    pub fn append_text(&self, text: &str) -> Result<(), ModelError> {
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::Text => {
                let end = doc.text_len(&self.path);
                Ok(doc.insert_text(&self.path, end, text)?)
            }
            kind => Err(ModelError::WrongKind {
                method: "append_text",
                kind,
            }),
        }
    }

    pub fn remove_text(&self, index: i64, count: usize) -> Result<(), ModelError> {
        let mut doc = self.doc.doc();
        match doc.kind(&self.path) {
            ValueKind::Text => {
                let size = doc.text_len(&self.path);
                let index = normalize_index(index, size, 0)?;
                let count = count.min(size - index);
                Ok(doc.remove_text(&self.path, index, count)?)
            }
            kind => Err(ModelError::WrongKind {
                method: "remove_text",
                kind,
            }),
        }
    }

    /// Replaces this location's value with `value`, emitting the minimal
    /// event sequence.
    ///
    /// Same-kind containers are diffed and the delta replayed in place, so
    /// untouched siblings see no events. A kind change is one set at the
    /// enclosing slot; the root's kind can never change.
    pub fn set_value(&self, value: &Value) -> Result<(), ModelError> {
        validate_value(value)?;
        let mut doc = self.doc.doc();
        let current = doc.get(&self.path);
        if current.as_ref() == Some(value) {
            return Ok(());
        }
        let same_kind = match (&current, value) {
            (Some(Value::Object(_)), Value::Object(_))
            | (Some(Value::Array(_)), Value::Array(_))
            | (Some(Value::String(_)), Value::String(_)) => true,
            _ => false,
        };
        if same_kind {
            let current = match current {
                Some(current) => current,
                None => return Ok(()),
            };
            for op in diff_values(&current, value, self.path.clone()) {
                apply_diff_op(doc.as_mut(), op)?;
            }
            return Ok(());
        }
        let parent = self.path.parent().ok_or(ModelError::RootReplace)?;
        let leaf = match self.path.leaf() {
            Some(leaf) => leaf.clone(),
            None => return Err(ModelError::RootReplace),
        };
        match doc.kind(&parent) {
            ValueKind::Dict => Ok(doc.set_dict_item(&parent, &leaf.key_string(), value.clone())?),
            ValueKind::List => {
                let index = leaf.as_index().ok_or(ModelError::InvalidValue)?;
                Ok(doc.set_list_item(&parent, index, value.clone())?)
            }
            kind => Err(ModelError::WrongKind {
                method: "set_value",
                kind,
            }),
        }
    }

    /// Subscribes to changes at or below this model's path.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(Change) + Send + Sync + 'static,
    {
        let id = self
            .doc
            .doc()
            .subscribe(self.path.clone(), Box::new(callback));
        SubscriptionHandle {
            doc: Arc::clone(&self.doc),
            id,
        }
    }
}
