//! json0 OT wire adapter.
//!
//! A [`SharedbDocument`] mirrors a remote document: every local mutation is
//! first encoded as json0 component ops and submitted through the
//! [`Transport`], then applied to the local tree with the shared mutation
//! bodies so subscribers observe the exact same change shapes as with the
//! in-memory backend. Remote ops arrive through [`SharedbStore::deliver`].
//! Any version disagreement is resolved pessimistically: refetch the
//! snapshot and report the delta as a diff.

use crate::diff::{diff_values, DiffOp};
use crate::document::{
    self, Callback, Document, DocumentError, Subscribers,
};
use crate::model::DocHandle;
use crate::registry::Store;
use crate::value::ValueKind;
use pathdoc_path::{Path, Step};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// One json0 component op.
///
/// `p` is the full slot path (container path plus the edited key or index).
/// Exactly which payload fields are set determines the op kind; `od`+`oi`
/// together encode a dict replace, `ld`+`li` a list slot replace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireOp {
    pub p: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oi: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub od: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub li: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ld: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub si: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sd: Option<String>,
}

/// A full document state as fetched from the remote peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: Value,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("version conflict: submitted at {local}, remote is at {remote}")]
    VersionConflict { local: u64, remote: u64 },
    #[error("document not found")]
    NotFound,
    #[error("connection closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

/// The remote side of one document.
///
/// `submit` returns the version the document is at after the op was
/// accepted.
pub trait Transport: Send {
    fn fetch(&mut self) -> Result<Snapshot, TransportError>;
    fn create(&mut self, data: &Value) -> Result<Snapshot, TransportError>;
    fn submit(&mut self, version: u64, source: u64, op: &WireOp) -> Result<u64, TransportError>;
}

/// Builds a transport for one document on one host.
pub type TransportFactory =
    Arc<dyn Fn(&str, &str) -> Result<Box<dyn Transport>, TransportError> + Send + Sync>;

const MIN_SOURCE_ID: u64 = 65_536;

/// A random id distinguishing this peer's ops from remote echoes.
fn generate_source_id() -> u64 {
    rand::thread_rng().gen_range(MIN_SOURCE_ID..=u64::from(u32::MAX))
}

fn split_wire_path(p: &[Step]) -> Result<(Path, Step), DocumentError> {
    let (last, init) = p.split_last().ok_or(DocumentError::MalformedOp)?;
    Ok((init.iter().cloned().collect(), last.clone()))
}

pub struct SharedbDocument {
    tree: Value,
    version: u64,
    source: u64,
    transport: Box<dyn Transport>,
    subscribers: Subscribers,
}

impl SharedbDocument {
    /// Fetches the current snapshot, creating an empty dict document when
    /// the remote has never seen this id.
    pub fn open(mut transport: Box<dyn Transport>) -> Result<SharedbDocument, DocumentError> {
        let snapshot = match transport.fetch() {
            Ok(snapshot) => snapshot,
            Err(TransportError::NotFound) => {
                transport.create(&Value::Object(serde_json::Map::new()))?
            }
            Err(err) => return Err(err.into()),
        };
        Ok(SharedbDocument {
            tree: snapshot.data,
            version: snapshot.version,
            source: generate_source_id(),
            transport,
            subscribers: Subscribers::new(),
        })
    }

    pub fn source(&self) -> u64 {
        self.source
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn wire_path(&self, path: &Path, key: Step) -> Vec<Step> {
        let mut p: Vec<Step> = path.steps().to_vec();
        p.push(key);
        p
    }

    fn submit_ops(&mut self, ops: Vec<WireOp>) -> Result<(), DocumentError> {
        for op in &ops {
            match self.transport.submit(self.version, self.source, op) {
                Ok(version) => self.version = version,
                Err(TransportError::VersionConflict { .. }) => {
                    self.resync()?;
                    return Err(DocumentError::Conflict);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Refetches the snapshot and reports the delta to subscribers as a
    /// structural diff of the stale tree against the fresh one.
    fn resync(&mut self) -> Result<(), DocumentError> {
        let snapshot = self.transport.fetch()?;
        let stale = std::mem::replace(&mut self.tree, snapshot.data);
        self.version = snapshot.version;
        for op in diff_values(&stale, &self.tree, Path::root()) {
            dispatch_diff_op(&mut self.subscribers, &self.tree, op);
        }
        Ok(())
    }

    /// Applies one op from the remote peer.
    ///
    /// Echoes of this peer's own ops are dropped (the submit ack already
    /// advanced the version). A version gap means missed ops; the document
    /// resyncs instead of guessing.
    pub fn apply_remote(
        &mut self,
        op: &WireOp,
        version: u64,
        source: u64,
    ) -> Result<(), DocumentError> {
        if source == self.source {
            return Ok(());
        }
        if version != self.version {
            return self.resync();
        }
        let (path, key) = split_wire_path(&op.p)?;
        if op.oi.is_some() || op.od.is_some() {
            let key = key.key_string();
            if let Some(value) = op.oi.clone() {
                document::apply_set_dict_item(
                    &mut self.tree,
                    &mut self.subscribers,
                    &path,
                    &key,
                    value,
                )?;
            } else {
                document::apply_remove_dict_item(
                    &mut self.tree,
                    &mut self.subscribers,
                    &path,
                    &key,
                )?;
            }
        } else if op.li.is_some() || op.ld.is_some() {
            let index = key.as_index().ok_or(DocumentError::MalformedOp)?;
            match (op.li.clone(), &op.ld) {
                (Some(item), Some(_)) => document::apply_set_list_item(
                    &mut self.tree,
                    &mut self.subscribers,
                    &path,
                    index,
                    item,
                )?,
                (Some(item), None) => document::apply_insert_list_items(
                    &mut self.tree,
                    &mut self.subscribers,
                    &path,
                    index,
                    vec![item],
                )?,
                (None, Some(_)) => document::apply_remove_list_items(
                    &mut self.tree,
                    &mut self.subscribers,
                    &path,
                    index,
                    1,
                )?,
                (None, None) => unreachable!(),
            }
        } else if let Some(text) = &op.si {
            let index = key.as_index().ok_or(DocumentError::MalformedOp)?;
            document::apply_insert_text(
                &mut self.tree,
                &mut self.subscribers,
                &path,
                index,
                text,
            )?;
        } else if let Some(text) = &op.sd {
            let index = key.as_index().ok_or(DocumentError::MalformedOp)?;
            document::apply_remove_text(
                &mut self.tree,
                &mut self.subscribers,
                &path,
                index,
                text.chars().count(),
            )?;
        } else {
            return Err(DocumentError::MalformedOp);
        }
        self.version = version + 1;
        Ok(())
    }
}

fn dispatch_diff_op(subscribers: &mut Subscribers, tree: &Value, op: DiffOp) {
    match op {
        DiffOp::DictSet {
            path,
            key,
            removed,
            inserted,
        } => document::dispatch_change(
            subscribers,
            tree,
            &path,
            Step::Key(key),
            removed,
            Some(inserted),
        ),
        DiffOp::DictRemove { path, key, removed } => document::dispatch_change(
            subscribers,
            tree,
            &path,
            Step::Key(key),
            Some(removed),
            None,
        ),
        DiffOp::ListSet {
            path,
            index,
            removed,
            inserted,
        } => document::dispatch_change(
            subscribers,
            tree,
            &path,
            Step::Index(index),
            Some(Value::Array(vec![removed])),
            Some(Value::Array(vec![inserted])),
        ),
        DiffOp::ListInsert { path, index, items } => document::dispatch_change(
            subscribers,
            tree,
            &path,
            Step::Index(index),
            Some(Value::Array(Vec::new())),
            Some(Value::Array(items)),
        ),
        DiffOp::ListRemove { path, index, items } => document::dispatch_change(
            subscribers,
            tree,
            &path,
            Step::Index(index),
            Some(Value::Array(items)),
            Some(Value::Array(Vec::new())),
        ),
        DiffOp::TextInsert { path, index, text } => document::dispatch_change(
            subscribers,
            tree,
            &path,
            Step::Index(index),
            Some(Value::String(String::new())),
            Some(Value::String(text)),
        ),
        DiffOp::TextRemove { path, index, text } => document::dispatch_change(
            subscribers,
            tree,
            &path,
            Step::Index(index),
            Some(Value::String(text)),
            Some(Value::String(String::new())),
        ),
    }
}

impl Document for SharedbDocument {
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
        document::dict_at_mut(&mut self.tree, path)?;
        let previous = path.child(key).lookup(&self.tree);
        let op = WireOp {
            p: self.wire_path(path, Step::Key(key.to_string())),
            oi: Some(value.clone()),
            od: previous,
            ..WireOp::default()
        };
        self.submit_ops(vec![op])?;
        document::apply_set_dict_item(&mut self.tree, &mut self.subscribers, path, key, value)
    }

    fn remove_dict_item(&mut self, path: &Path, key: &str) -> Result<(), DocumentError> {
        document::dict_at_mut(&mut self.tree, path)?;
        let previous = match path.child(key).lookup(&self.tree) {
            Some(previous) => previous,
            None => return Ok(()),
        };
        let op = WireOp {
            p: self.wire_path(path, Step::Key(key.to_string())),
            od: Some(previous),
            ..WireOp::default()
        };
        self.submit_ops(vec![op])?;
        document::apply_remove_dict_item(&mut self.tree, &mut self.subscribers, path, key)
    }

    fn set_list_item(
        &mut self,
        path: &Path,
        index: usize,
        item: Value,
    ) -> Result<(), DocumentError> {
        let previous = document::list_at_mut(&mut self.tree, path)?
            .get(index)
            .cloned()
            .ok_or_else(|| DocumentError::OutOfBounds {
                path: path.to_string(),
                index,
            })?;
        let op = WireOp {
            p: self.wire_path(path, Step::Index(index)),
            li: Some(item.clone()),
            ld: Some(previous),
            ..WireOp::default()
        };
        self.submit_ops(vec![op])?;
        document::apply_set_list_item(&mut self.tree, &mut self.subscribers, path, index, item)
    }

    fn insert_list_items(
        &mut self,
        path: &Path,
        index: usize,
        items: Vec<Value>,
    ) -> Result<(), DocumentError> {
        if items.is_empty() {
            return Ok(());
        }
        let len = document::list_at_mut(&mut self.tree, path)?.len();
        let at = index.min(len);
        // One component op per element, in order; dispatched locally as a
        // single range insert.
        let ops: Vec<WireOp> = items
            .iter()
            .enumerate()
            .map(|(offset, item)| WireOp {
                p: self.wire_path(path, Step::Index(at + offset)),
                li: Some(item.clone()),
                ..WireOp::default()
            })
            .collect();
        self.submit_ops(ops)?;
        document::apply_insert_list_items(&mut self.tree, &mut self.subscribers, path, at, items)
    }

    fn remove_list_items(
        &mut self,
        path: &Path,
        index: usize,
        count: usize,
    ) -> Result<(), DocumentError> {
        let list = document::list_at_mut(&mut self.tree, path)?;
        let at = index.min(list.len());
        let end = (at + count).min(list.len());
        if at == end {
            return Ok(());
        }
        // Every removal targets the same index; the list shifts under it.
        let removed: Vec<Value> = list[at..end].to_vec();
        let ops: Vec<WireOp> = removed
            .into_iter()
            .map(|item| WireOp {
                p: self.wire_path(path, Step::Index(at)),
                ld: Some(item),
                ..WireOp::default()
            })
            .collect();
        self.submit_ops(ops)?;
        document::apply_remove_list_items(
            &mut self.tree,
            &mut self.subscribers,
            path,
            at,
            end - at,
        )
    }

    fn insert_text(&mut self, path: &Path, index: usize, text: &str) -> Result<(), DocumentError> {
        if text.is_empty() {
            return Ok(());
        }
        let len = document::text_at_mut(&mut self.tree, path)?.chars().count();
        let at = index.min(len);
        let op = WireOp {
            p: self.wire_path(path, Step::Index(at)),
            si: Some(text.to_string()),
            ..WireOp::default()
        };
        self.submit_ops(vec![op])?;
        document::apply_insert_text(&mut self.tree, &mut self.subscribers, path, at, text)
    }

    fn remove_text(
        &mut self,
        path: &Path,
        index: usize,
        count: usize,
    ) -> Result<(), DocumentError> {
        let chars: Vec<char> = document::text_at_mut(&mut self.tree, path)?.chars().collect();
        let at = index.min(chars.len());
        let end = (at + count).min(chars.len());
        if at == end {
            return Ok(());
        }
        let removed: String = chars[at..end].iter().collect();
        let op = WireOp {
            p: self.wire_path(path, Step::Index(at)),
            sd: Some(removed),
            ..WireOp::default()
        };
        self.submit_ops(vec![op])?;
        document::apply_remove_text(&mut self.tree, &mut self.subscribers, path, at, end - at)
    }

    fn subscribe(&mut self, path: Path, callback: Callback) -> u64 {
        self.subscribers.add(path, callback)
    }

    fn unsubscribe(&mut self, id: u64) -> bool {
        self.subscribers.remove(id)
    }
}

/// Shared-ownership view of a sharedb document, so the store can keep
/// delivering remote ops to a document that is also behind a [`DocHandle`].
struct SharedbDocRef {
    doc: Arc<Mutex<SharedbDocument>>,
}

impl SharedbDocRef {
    fn lock(&self) -> std::sync::MutexGuard<'_, SharedbDocument> {
        self.doc.lock().expect("sharedb document lock poisoned")
    }
}

impl Document for SharedbDocRef {
    fn kind(&self, path: &Path) -> ValueKind {
        self.lock().kind(path)
    }

    fn get(&self, path: &Path) -> Option<Value> {
        self.lock().get(path)
    }

    fn dict_keys(&self, path: &Path) -> Vec<String> {
        self.lock().dict_keys(path)
    }

    fn list_len(&self, path: &Path) -> usize {
        self.lock().list_len(path)
    }

    fn text_len(&self, path: &Path) -> usize {
        self.lock().text_len(path)
    }

    fn set_dict_item(
        &mut self,
        path: &Path,
        key: &str,
        value: Value,
    ) -> Result<(), DocumentError> {
        self.lock().set_dict_item(path, key, value)
    }

    fn remove_dict_item(&mut self, path: &Path, key: &str) -> Result<(), DocumentError> {
        self.lock().remove_dict_item(path, key)
    }

    fn set_list_item(
        &mut self,
        path: &Path,
        index: usize,
        item: Value,
    ) -> Result<(), DocumentError> {
        self.lock().set_list_item(path, index, item)
    }

    fn insert_list_items(
        &mut self,
        path: &Path,
        index: usize,
        items: Vec<Value>,
    ) -> Result<(), DocumentError> {
        self.lock().insert_list_items(path, index, items)
    }

    fn remove_list_items(
        &mut self,
        path: &Path,
        index: usize,
        count: usize,
    ) -> Result<(), DocumentError> {
        self.lock().remove_list_items(path, index, count)
    }

    fn insert_text(&mut self, path: &Path, index: usize, text: &str) -> Result<(), DocumentError> {
        self.lock().insert_text(path, index, text)
    }

    fn remove_text(
        &mut self,
        path: &Path,
        index: usize,
        count: usize,
    ) -> Result<(), DocumentError> {
        self.lock().remove_text(path, index, count)
    }

    fn subscribe(&mut self, path: Path, callback: Callback) -> u64 {
        self.lock().subscribe(path, callback)
    }

    fn unsubscribe(&mut self, id: u64) -> bool {
        self.lock().unsubscribe(id)
    }
}

struct SharedbEntry {
    handle: Arc<DocHandle>,
    doc: Arc<Mutex<SharedbDocument>>,
}

/// Keeps one live sharedb document per id on one host.
pub struct SharedbStore {
    host: String,
    factory: TransportFactory,
    docs: HashMap<String, SharedbEntry>,
}

impl SharedbStore {
    pub fn new(host: &str, factory: TransportFactory) -> SharedbStore {
        SharedbStore {
            host: host.to_string(),
            factory,
            docs: HashMap::new(),
        }
    }

    /// Feeds one remote op into an open document.
    pub fn deliver(
        &mut self,
        doc_id: &str,
        op: &WireOp,
        version: u64,
        source: u64,
    ) -> Result<(), DocumentError> {
        let entry = self
            .docs
            .get(doc_id)
            .ok_or_else(|| DocumentError::NotOpen(doc_id.to_string()))?;
        entry
            .doc
            .lock()
            .expect("sharedb document lock poisoned")
            .apply_remote(op, version, source)
    }
}

impl Store for SharedbStore {
    fn open(&mut self, doc_id: &str) -> Result<Arc<DocHandle>, DocumentError> {
        if let Some(entry) = self.docs.get(doc_id) {
            return Ok(Arc::clone(&entry.handle));
        }
        let transport = (self.factory)(&self.host, doc_id)?;
        let doc = Arc::new(Mutex::new(SharedbDocument::open(transport)?));
        let handle = DocHandle::new(Box::new(SharedbDocRef {
            doc: Arc::clone(&doc),
        }));
        self.docs.insert(
            doc_id.to_string(),
            SharedbEntry {
                handle: Arc::clone(&handle),
                doc,
            },
        );
        Ok(handle)
    }
}
