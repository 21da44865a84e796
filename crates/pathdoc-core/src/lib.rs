//! Path-addressed document model.
//!
//! A [`document::Document`] is one JSON-like tree plus its live
//! subscriptions. Mutations go through a fixed contract of typed primitives,
//! each of which dispatches exactly one [`change::Change`] to the
//! subscribers whose paths it intersects, identically whether the tree is a
//! plain in-memory structure ([`memory::MemoryDocument`]) or mirrors a
//! remote peer over the json0 OT wire ([`sharedb::SharedbDocument`]).
//! [`model::Model`] is the validated, cached, path-navigable façade on top.

pub mod change;
pub mod diff;
pub mod document;
pub mod memory;
pub mod model;
pub mod registry;
pub mod sharedb;
pub mod value;

pub use pathdoc_path::{Path, Step};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
