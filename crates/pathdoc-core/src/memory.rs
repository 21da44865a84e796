//! Plain in-memory backend, the reference implementation of the document
//! contract.

use crate::document::{
    self, Callback, Document, DocumentError, Subscribers,
};
use crate::model::DocHandle;
use crate::registry::Store;
use crate::value::ValueKind;
use pathdoc_path::Path;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MemoryDocument {
    tree: Value,
    subscribers: Subscribers,
}

impl MemoryDocument {
    pub fn new(tree: Value) -> MemoryDocument {
        MemoryDocument {
            tree,
            subscribers: Subscribers::new(),
        }
    }

    /// An empty dict root, the shape every freshly created document starts
    /// with.
    pub fn empty() -> MemoryDocument {
        MemoryDocument::new(Value::Object(serde_json::Map::new()))
    }
}

impl Document for MemoryDocument {
    fn kind(&self, path: &Path) -> ValueKind {
        document::kind_at(&self.tree, path)
    }

    fn get(&self, path: &Path) -> Option<Value> {
        path.lookup(&self.tree)
    }

    fn dict_keys(&self, path: &Path) -> Vec<String> {
        document::keys_at(&self.tree, path)
    }

    fn list_len(&self, path: &Path) -> usize {
        document::list_len_at(&self.tree, path)
    }

    fn text_len(&self, path: &Path) -> usize {
        document::text_len_at(&self.tree, path)
    }

    fn set_dict_item(
        &mut self,
        path: &Path,
        key: &str,
        value: Value,
    ) -> Result<(), DocumentError> {
        document::apply_set_dict_item(&mut self.tree, &mut self.subscribers, path, key, value)
    }

    fn remove_dict_item(&mut self, path: &Path, key: &str) -> Result<(), DocumentError> {
        document::apply_remove_dict_item(&mut self.tree, &mut self.subscribers, path, key)
    }

    fn set_list_item(
        &mut self,
        path: &Path,
        index: usize,
        item: Value,
    ) -> Result<(), DocumentError> {
        document::apply_set_list_item(&mut self.tree, &mut self.subscribers, path, index, item)
    }

    fn insert_list_items(
        &mut self,
        path: &Path,
        index: usize,
        items: Vec<Value>,
    ) -> Result<(), DocumentError> {
        document::apply_insert_list_items(
            &mut self.tree,
            &mut self.subscribers,
            path,
            index,
            items,
        )
    }

    fn remove_list_items(
        &mut self,
        path: &Path,
        index: usize,
        count: usize,
    ) -> Result<(), DocumentError> {
        document::apply_remove_list_items(
            &mut self.tree,
            &mut self.subscribers,
            path,
            index,
            count,
        )
    }

    fn insert_text(&mut self, path: &Path, index: usize, text: &str) -> Result<(), DocumentError> {
        document::apply_insert_text(&mut self.tree, &mut self.subscribers, path, index, text)
    }

    fn remove_text(
        &mut self,
        path: &Path,
        index: usize,
        count: usize,
    ) -> Result<(), DocumentError> {
        document::apply_remove_text(&mut self.tree, &mut self.subscribers, path, index, count)
    }

    fn subscribe(&mut self, path: Path, callback: Callback) -> u64 {
        self.subscribers.add(path, callback)
    }

    fn unsubscribe(&mut self, id: u64) -> bool {
        self.subscribers.remove(id)
    }
}

/// Keeps one document per id; reopening an id yields the same handle.
pub struct MemoryStore {
    docs: HashMap<String, Arc<DocHandle>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            docs: HashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> MemoryStore {
        MemoryStore::new()
    }
}

impl Store for MemoryStore {
    fn open(&mut self, doc_id: &str) -> Result<Arc<DocHandle>, DocumentError> {
        let handle = self
            .docs
            .entry(doc_id.to_string())
            .or_insert_with(|| DocHandle::new(Box::new(MemoryDocument::empty())));
        Ok(Arc::clone(handle))
    }
}
