//! One atomic structural edit and its projection onto subscription paths.

use crate::value::ValueKind;
use pathdoc_path::{Path, Step};
use serde_json::Value;

/// One atomic edit at `path`/`key`, tagged with the kind of the container at
/// `path` when it was dispatched.
///
/// Payload shapes follow the edit kind: a scalar pair for dict and
/// single-slot list edits, an array pair for list range edits, a string pair
/// for text edits. `None` encodes the absent side (a fresh dict insert has
/// no `removed`, a dict removal has no `inserted`).
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: Path,
    pub key: Step,
    pub kind: ValueKind,
    pub removed: Option<Value>,
    pub inserted: Option<Value>,
}

impl Change {
    pub fn new(
        path: Path,
        key: Step,
        kind: ValueKind,
        removed: Option<Value>,
        inserted: Option<Value>,
    ) -> Change {
        Change {
            path,
            key,
            kind,
            removed,
            inserted,
        }
    }

    /// Projects this change onto a subscription path.
    ///
    /// Exactly one of three outcomes:
    /// - `None` when neither path prefixes the other (the subscriber is not
    ///   notified);
    /// - a narrowed change when the edit happened at or inside the
    ///   subscribed location: same payloads, path rewritten relative to the
    ///   subscription;
    /// - a root-projected change when the edit happened strictly above the
    ///   subscribed location: the remaining suffix is resolved inside the
    ///   `removed`/`inserted` payloads to report what changed *at* the
    ///   subscribed location. A suffix that addresses a slot the edit did
    ///   not touch projects to `None`; descending below a scalar payload
    ///   yields `None` payload sides (there is nothing deeper to resolve).
    pub fn project(&self, subscription: &Path) -> Option<Change> {
        if self.path.starts_with(subscription) {
            return Some(Change {
                path: self.path.slice(subscription.len()),
                ..self.clone()
            });
        }
        if !subscription.starts_with(&self.path) {
            return None;
        }

        let rest = subscription.slice(self.path.len());
        let first = rest.steps().first()?;
        let tail = rest.slice(1);

        let (removed_at, inserted_at, touched) = match self.kind {
            ValueKind::Dict => {
                if first.addresses_same_slot(&self.key) {
                    (self.removed.clone(), self.inserted.clone(), true)
                } else {
                    (None, None, false)
                }
            }
            ValueKind::List => match (first.as_index(), self.key.as_index()) {
                (Some(slot), Some(base)) => {
                    let removed = slice_element(self.removed.as_ref(), slot, base);
                    let inserted = slice_element(self.inserted.as_ref(), slot, base);
                    let touched = removed.is_some() || inserted.is_some();
                    (removed, inserted, touched)
                }
                _ => (None, None, false),
            },
            ValueKind::Text => match (first.as_index(), self.key.as_index()) {
                (Some(slot), Some(base)) => {
                    let removed = span_char(self.removed.as_ref(), slot, base);
                    let inserted = span_char(self.inserted.as_ref(), slot, base);
                    let touched = removed.is_some() || inserted.is_some();
                    (removed, inserted, touched)
                }
                _ => (None, None, false),
            },
            _ => (None, None, false),
        };
        if !touched {
            return None;
        }

        Some(Change {
            path: Path::root(),
            key: subscription.leaf().cloned()?,
            kind: self.kind,
            removed: descend(removed_at, &tail),
            inserted: descend(inserted_at, &tail),
        })
    }
}

/// Element of a list-edit payload, re-based from the edited window onto the
/// payload array.
fn slice_element(payload: Option<&Value>, slot: usize, base: usize) -> Option<Value> {
    let items = payload?.as_array()?;
    items.get(slot.checked_sub(base)?).cloned()
}

/// Character of a text-edit payload, as a one-char string.
fn span_char(payload: Option<&Value>, slot: usize, base: usize) -> Option<Value> {
    let text = payload?.as_str()?;
    let character = text.chars().nth(slot.checked_sub(base)?)?;
    Some(Value::String(character.to_string()))
}

fn descend(value: Option<Value>, tail: &Path) -> Option<Value> {
    let value = value?;
    if tail.is_empty() {
        return Some(value);
    }
    tail.lookup(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dict_set(path: &str, key: &str, removed: Option<Value>, inserted: Value) -> Change {
        Change::new(
            Path::parse(path),
            Step::Key(key.to_string()),
            ValueKind::Dict,
            removed,
            Some(inserted),
        )
    }

    #[test]
    fn unrelated_paths_project_to_none() {
        let change = dict_set("a/b", "c", None, json!(1));
        assert_eq!(change.project(&Path::parse("a/x")), None);
        assert_eq!(change.project(&Path::parse("z")), None);
    }

    #[test]
    fn narrowing_rewrites_the_path() {
        let change = dict_set("a/b", "c", Some(json!(1)), json!(2));
        let projected = change.project(&Path::parse("a")).unwrap();
        assert_eq!(projected.path, Path::parse("b"));
        assert_eq!(projected.key, Step::Key("c".to_string()));
        assert_eq!(projected.removed, Some(json!(1)));
        assert_eq!(projected.inserted, Some(json!(2)));

        let at_change = change.project(&Path::parse("a/b")).unwrap();
        assert_eq!(at_change.path, Path::root());
    }

    #[test]
    fn root_projection_at_the_edited_key() {
        let change = dict_set("a", "c", Some(json!({"x": 1})), json!({"x": 2}));
        let projected = change.project(&Path::parse("a/c")).unwrap();
        assert_eq!(projected.path, Path::root());
        assert_eq!(projected.removed, Some(json!({"x": 1})));
        assert_eq!(projected.inserted, Some(json!({"x": 2})));
    }

    #[test]
    fn root_projection_descends_into_payloads() {
        let change = dict_set("a", "c", Some(json!({"x": 1})), json!({"x": 2, "y": 3}));
        let projected = change.project(&Path::parse("a/c/y")).unwrap();
        assert_eq!(projected.removed, None);
        assert_eq!(projected.inserted, Some(json!(3)));
        assert_eq!(projected.key, Step::Key("y".to_string()));
    }

    #[test]
    fn root_projection_of_sibling_key_is_none() {
        let change = dict_set("a", "c", None, json!(1));
        assert_eq!(change.project(&Path::parse("a/d")), None);
        assert_eq!(change.project(&Path::parse("a/d/deeper")), None);
    }

    #[test]
    fn descent_below_a_replaced_scalar_yields_none_payloads() {
        let change = dict_set("a", "c", Some(json!({"x": 1})), json!(7));
        let projected = change.project(&Path::parse("a/c/x")).unwrap();
        assert_eq!(projected.removed, Some(json!(1)));
        assert_eq!(projected.inserted, None);

        let below_scalar = change.project(&Path::parse("a/c/q")).unwrap();
        assert_eq!(below_scalar.removed, None);
        assert_eq!(below_scalar.inserted, None);
    }

    #[test]
    fn list_window_projection_is_rebased() {
        let change = Change::new(
            Path::parse("items"),
            Step::Index(2),
            ValueKind::List,
            Some(json!([])),
            Some(json!(["x", "y"])),
        );
        let at_2 = change.project(&Path::parse("items/2")).unwrap();
        assert_eq!(at_2.inserted, Some(json!("x")));
        assert_eq!(at_2.removed, None);
        let at_3 = change.project(&Path::parse("items/3")).unwrap();
        assert_eq!(at_3.inserted, Some(json!("y")));
        assert_eq!(change.project(&Path::parse("items/4")), None);
        assert_eq!(change.project(&Path::parse("items/1")), None);
    }

    #[test]
    fn text_window_projection_extracts_characters() {
        let change = Change::new(
            Path::parse("s"),
            Step::Index(1),
            ValueKind::Text,
            Some(json!("")),
            Some(json!("Zq")),
        );
        let at_1 = change.project(&Path::parse("s/1")).unwrap();
        assert_eq!(at_1.inserted, Some(json!("Z")));
        let at_2 = change.project(&Path::parse("s/2")).unwrap();
        assert_eq!(at_2.inserted, Some(json!("q")));
        assert_eq!(change.project(&Path::parse("s/0")), None);
    }
}
