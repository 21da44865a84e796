//! URL-addressed access to documents across stores.
//!
//! A url has the shape `protocol://host/doc_id[/path...]`; the registry
//! keeps one store per `protocol://host` prefix and hands out models through
//! it, so resolving the same url twice yields the same model.

use crate::document::DocumentError;
use crate::memory::MemoryStore;
use crate::model::{DocHandle, Model, ModelError};
use crate::sharedb::{SharedbStore, TransportFactory};
use pathdoc_path::Path;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// One protocol backend: opens documents by id, idempotently.
pub trait Store: Send {
    fn open(&mut self, doc_id: &str) -> Result<Arc<DocHandle>, DocumentError>;
}

#[derive(Debug, Clone, PartialEq)]
struct StoreUrl {
    protocol: String,
    host: String,
    doc_id: String,
    path: Path,
}

impl StoreUrl {
    fn parse(url: &str) -> Result<StoreUrl, ModelError> {
        let (protocol, rest) = url
            .split_once("://")
            .ok_or_else(|| ModelError::InvalidUrl(url.to_string()))?;
        let mut segments = rest.split('/');
        let host = segments.next().filter(|host| !host.is_empty());
        let doc_id = segments.next().filter(|id| !id.is_empty());
        let (host, doc_id) = match (host, doc_id) {
            (Some(host), Some(doc_id)) => (host, doc_id),
            _ => return Err(ModelError::InvalidUrl(url.to_string())),
        };
        let path = segments
            .filter(|segment| !segment.is_empty())
            .map(pathdoc_path::Step::from_segment)
            .collect();
        Ok(StoreUrl {
            protocol: protocol.to_string(),
            host: host.to_string(),
            doc_id: doc_id.to_string(),
            path,
        })
    }

    fn store_key(&self) -> String {
        format!("{}://{}", self.protocol, self.host)
    }
}

pub struct Registry {
    stores: HashMap<String, Box<dyn Store>>,
    transports: Option<TransportFactory>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            stores: HashMap::new(),
            transports: None,
        }
    }

    /// A registry that can open remote stores through `factory`.
    pub fn with_transports(factory: TransportFactory) -> Registry {
        Registry {
            stores: HashMap::new(),
            transports: Some(factory),
        }
    }

    /// Resolves a url to the model at its path, opening the store and the
    /// document on first use.
    pub fn resolve(&mut self, url: &str) -> Result<Arc<Model>, ModelError> {
        let parsed = StoreUrl::parse(url)?;
        let store = match self.stores.entry(parsed.store_key()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let store: Box<dyn Store> = match parsed.protocol.as_str() {
                    "memory" => Box::new(MemoryStore::new()),
                    "sharedb" => {
                        let factory =
                            self.transports.as_ref().ok_or(ModelError::NoTransport)?;
                        Box::new(SharedbStore::new(&parsed.host, Arc::clone(factory)))
                    }
                    other => return Err(ModelError::UnknownProtocol(other.to_string())),
                };
                entry.insert(store)
            }
        };
        let handle = store.open(&parsed.doc_id)?;
        Ok(handle.model(parsed.path))
    }

    /// Drops a store and every document it holds; returns whether it was
    /// open. Models handed out earlier stay alive through their own `Arc`s.
    pub fn disconnect(&mut self, store_key: &str) -> bool {
        self.stores.remove(store_key).is_some()
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathdoc_path::Step;

    #[test]
    fn url_parsing() {
        let url = StoreUrl::parse("memory://local/doc1/a/0/b").unwrap();
        assert_eq!(url.protocol, "memory");
        assert_eq!(url.host, "local");
        assert_eq!(url.doc_id, "doc1");
        assert_eq!(
            url.path,
            Path::from(vec![
                Step::Key("a".to_string()),
                Step::Index(0),
                Step::Key("b".to_string()),
            ])
        );
        assert_eq!(url.store_key(), "memory://local");

        let root = StoreUrl::parse("memory://local/doc1").unwrap();
        assert_eq!(root.path, Path::root());
    }

    #[test]
    fn malformed_urls_are_rejected() {
        assert!(matches!(
            StoreUrl::parse("no-scheme"),
            Err(ModelError::InvalidUrl(_))
        ));
        assert!(matches!(
            StoreUrl::parse("memory://hostonly"),
            Err(ModelError::InvalidUrl(_))
        ));
        assert!(matches!(
            StoreUrl::parse("memory:///doc"),
            Err(ModelError::InvalidUrl(_))
        ));
    }
}
