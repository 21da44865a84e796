//! Before/after value differencing.
//!
//! Produces a flat list of [`DiffOp`]s that, replayed through the document
//! mutation primitives, turn `before` into `after` with per-key, per-slot,
//! and per-text-span granularity. Plain recursion; diffs are small and
//! local.

use pathdoc_path::{Path, Step};
use serde_json::Value;

/// One replayable edit, mirroring the document mutation table.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOp {
    DictSet {
        path: Path,
        key: String,
        removed: Option<Value>,
        inserted: Value,
    },
    DictRemove {
        path: Path,
        key: String,
        removed: Value,
    },
    ListSet {
        path: Path,
        index: usize,
        removed: Value,
        inserted: Value,
    },
    ListInsert {
        path: Path,
        index: usize,
        items: Vec<Value>,
    },
    ListRemove {
        path: Path,
        index: usize,
        items: Vec<Value>,
    },
    TextInsert {
        path: Path,
        index: usize,
        text: String,
    },
    TextRemove {
        path: Path,
        index: usize,
        text: String,
    },
}

/// Diffs two values of the same structural kind, rooted at `path`.
///
/// Containers of matching kind recurse; a kind change inside a container
/// falls back to a single set at the enclosing slot. Equal subtrees emit
/// nothing. Diffing mismatched root kinds is the caller's concern and emits
/// nothing here.
pub fn diff_values(before: &Value, after: &Value, path: Path) -> Vec<DiffOp> {
    let mut out = Vec::new();
    collect(before, after, &path, &mut out);
    out
}

fn same_container_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Object(_), Value::Object(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::String(_), Value::String(_))
    )
}

fn collect(before: &Value, after: &Value, path: &Path, out: &mut Vec<DiffOp>) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            // Set every key present in the destination, then remove every
            // source key the destination dropped.
            for (key, after_value) in a {
                match b.get(key) {
                    Some(before_value) if before_value == after_value => {}
                    Some(before_value) if same_container_kind(before_value, after_value) => {
                        collect(
                            before_value,
                            after_value,
                            &path.child(Step::Key(key.clone())),
                            out,
                        );
                    }
                    other => out.push(DiffOp::DictSet {
                        path: path.clone(),
                        key: key.clone(),
                        removed: other.cloned(),
                        inserted: after_value.clone(),
                    }),
                }
            }
            for (key, before_value) in b {
                if !a.contains_key(key) {
                    out.push(DiffOp::DictRemove {
                        path: path.clone(),
                        key: key.clone(),
                        removed: before_value.clone(),
                    });
                }
            }
        }
        (Value::Array(b), Value::Array(a)) => collect_list(b, a, path, out),
        (Value::String(b), Value::String(a)) => collect_text(b, a, path, out),
        _ => {}
    }
}

fn collect_list(before: &[Value], after: &[Value], path: &Path, out: &mut Vec<DiffOp>) {
    let shorter = before.len().min(after.len());
    let mut prefix = 0;
    while prefix < shorter && before[prefix] == after[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < shorter - prefix
        && before[before.len() - 1 - suffix] == after[after.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let before_mid = &before[prefix..before.len() - suffix];
    let after_mid = &after[prefix..after.len() - suffix];
    if before_mid.len() == after_mid.len() {
        // Equal-length middles diff slot by slot, keeping events minimal.
        for (offset, (before_value, after_value)) in
            before_mid.iter().zip(after_mid).enumerate()
        {
            if before_value == after_value {
                continue;
            }
            let index = prefix + offset;
            if same_container_kind(before_value, after_value) {
                collect(before_value, after_value, &path.child(index), out);
            } else {
                out.push(DiffOp::ListSet {
                    path: path.clone(),
                    index,
                    removed: before_value.clone(),
                    inserted: after_value.clone(),
                });
            }
        }
    } else {
        if !before_mid.is_empty() {
            out.push(DiffOp::ListRemove {
                path: path.clone(),
                index: prefix,
                items: before_mid.to_vec(),
            });
        }
        if !after_mid.is_empty() {
            out.push(DiffOp::ListInsert {
                path: path.clone(),
                index: prefix,
                items: after_mid.to_vec(),
            });
        }
    }
}

fn collect_text(before: &str, after: &str, path: &Path, out: &mut Vec<DiffOp>) {
    let b: Vec<char> = before.chars().collect();
    let a: Vec<char> = after.chars().collect();
    let shorter = b.len().min(a.len());
    let mut prefix = 0;
    while prefix < shorter && b[prefix] == a[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < shorter - prefix && b[b.len() - 1 - suffix] == a[a.len() - 1 - suffix] {
        suffix += 1;
    }

    let removed: String = b[prefix..b.len() - suffix].iter().collect();
    let inserted: String = a[prefix..a.len() - suffix].iter().collect();
    if !removed.is_empty() {
        out.push(DiffOp::TextRemove {
            path: path.clone(),
            index: prefix,
            text: removed,
        });
    }
    if !inserted.is_empty() {
        out.push(DiffOp::TextInsert {
            path: path.clone(),
            index: prefix,
            text: inserted,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_values_diff_to_nothing() {
        let v = json!({"a": [1, "x"], "b": {"c": true}});
        assert!(diff_values(&v, &v.clone(), Path::root()).is_empty());
    }

    #[test]
    fn dict_diff_sets_then_removes() {
        let before = json!({"keep": 1, "change": 2, "drop": 3});
        let after = json!({"keep": 1, "change": 20, "fresh": 4});
        let ops = diff_values(&before, &after, Path::root());
        assert_eq!(
            ops,
            vec![
                DiffOp::DictSet {
                    path: Path::root(),
                    key: "change".to_string(),
                    removed: Some(json!(2)),
                    inserted: json!(20),
                },
                DiffOp::DictSet {
                    path: Path::root(),
                    key: "fresh".to_string(),
                    removed: None,
                    inserted: json!(4),
                },
                DiffOp::DictRemove {
                    path: Path::root(),
                    key: "drop".to_string(),
                    removed: json!(3),
                },
            ]
        );
    }

    #[test]
    fn nested_containers_recurse() {
        let before = json!({"a": {"b": 1}});
        let after = json!({"a": {"b": 2}});
        let ops = diff_values(&before, &after, Path::root());
        assert_eq!(
            ops,
            vec![DiffOp::DictSet {
                path: Path::parse("a"),
                key: "b".to_string(),
                removed: Some(json!(1)),
                inserted: json!(2),
            }]
        );
    }

    #[test]
    fn kind_change_falls_back_to_slot_set() {
        let before = json!({"a": {"b": 1}});
        let after = json!({"a": [1]});
        let ops = diff_values(&before, &after, Path::root());
        assert_eq!(
            ops,
            vec![DiffOp::DictSet {
                path: Path::root(),
                key: "a".to_string(),
                removed: Some(json!({"b": 1})),
                inserted: json!([1]),
            }]
        );
    }

    #[test]
    fn list_diff_trims_common_ends() {
        let before = json!([1, 2, 3, 4]);
        let after = json!([1, "a", "b", 4]);
        let ops = diff_values(&before, &after, Path::parse("l"));
        assert_eq!(
            ops,
            vec![
                DiffOp::ListSet {
                    path: Path::parse("l"),
                    index: 1,
                    removed: json!(2),
                    inserted: json!("a"),
                },
                DiffOp::ListSet {
                    path: Path::parse("l"),
                    index: 2,
                    removed: json!(3),
                    inserted: json!("b"),
                },
            ]
        );
    }

    #[test]
    fn list_diff_replaces_unequal_middles() {
        let before = json!([1, 2, 3]);
        let after = json!([1, 9, 8, 7, 3]);
        let ops = diff_values(&before, &after, Path::parse("l"));
        assert_eq!(
            ops,
            vec![
                DiffOp::ListRemove {
                    path: Path::parse("l"),
                    index: 1,
                    items: vec![json!(2)],
                },
                DiffOp::ListInsert {
                    path: Path::parse("l"),
                    index: 1,
                    items: vec![json!(9), json!(8), json!(7)],
                },
            ]
        );
    }

    #[test]
    fn text_diff_is_a_span_replace() {
        let ops = diff_values(&json!("hello world"), &json!("hello brave world"), Path::parse("t"));
        assert_eq!(
            ops,
            vec![DiffOp::TextInsert {
                path: Path::parse("t"),
                index: 6,
                text: "brave ".to_string(),
            }]
        );

        let ops = diff_values(&json!("AxB"), &json!("AyB"), Path::parse("t"));
        assert_eq!(
            ops,
            vec![
                DiffOp::TextRemove {
                    path: Path::parse("t"),
                    index: 1,
                    text: "x".to_string(),
                },
                DiffOp::TextInsert {
                    path: Path::parse("t"),
                    index: 1,
                    text: "y".to_string(),
                },
            ]
        );
    }
}
