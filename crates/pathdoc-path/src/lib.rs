//! Path addressing for JSON-like trees.
//!
//! A [`Path`] is an immutable sequence of [`Step`]s (string keys or
//! non-negative indices) with a `/`-joined string form. Lookups are total:
//! any path can be resolved against any tree and a mismatch yields `None`,
//! never a panic.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One segment of a [`Path`]: a dictionary key or a list/text index.
///
/// Serializes untagged, so a step is a JSON string or number, the element
/// shape of a json0 op `p` array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Index(usize),
    Key(String),
}

impl Step {
    /// Parses one string segment. All-digit segments become indices.
    pub fn from_segment(segment: &str) -> Step {
        match segment.parse::<usize>() {
            Ok(index) => Step::Index(index),
            Err(_) => Step::Key(segment.to_string()),
        }
    }

    /// The step as a list/text index, when it can be one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Step::Index(index) => Some(*index),
            Step::Key(key) => key.parse::<usize>().ok(),
        }
    }

    /// The step as a dictionary key string.
    pub fn key_string(&self) -> String {
        match self {
            Step::Key(key) => key.clone(),
            Step::Index(index) => index.to_string(),
        }
    }

    /// Canonical equality: `Key("3")` and `Index(3)` address the same slot.
    pub fn addresses_same_slot(&self, other: &Step) -> bool {
        match (self, other) {
            (Step::Key(a), Step::Key(b)) => a == b,
            (Step::Index(a), Step::Index(b)) => a == b,
            (Step::Key(k), Step::Index(i)) | (Step::Index(i), Step::Key(k)) => {
                k.parse::<usize>().ok() == Some(*i)
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Key(key) => f.write_str(key),
            Step::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<usize> for Step {
    fn from(index: usize) -> Step {
        Step::Index(index)
    }
}

impl From<&str> for Step {
    fn from(segment: &str) -> Step {
        Step::from_segment(segment)
    }
}

impl From<String> for Step {
    fn from(segment: String) -> Step {
        Step::from_segment(&segment)
    }
}

/// An ordered, immutable sequence of steps addressing a location in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<Step>);

impl Path {
    /// The empty path, addressing the tree root.
    pub fn root() -> Path {
        Path(Vec::new())
    }

    /// Parses a `/`-joined path string. Empty segments are dropped; there is
    /// no escaping mechanism for embedded separators. Never fails.
    pub fn parse(path: &str) -> Path {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .map(Step::from_segment)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    /// `true` when `prefix` addresses this location or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The suffix from step `from` onward.
    pub fn slice(&self, from: usize) -> Path {
        Path(self.0.get(from..).unwrap_or_default().to_vec())
    }

    /// The path of the enclosing container, or `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    /// The final step, or `None` at the root.
    pub fn leaf(&self) -> Option<&Step> {
        self.0.last()
    }

    /// A new path descending one step.
    pub fn child(&self, step: impl Into<Step>) -> Path {
        let mut steps = self.0.clone();
        steps.push(step.into());
        Path(steps)
    }

    /// A new path descending through all of `other`'s steps.
    pub fn concat(&self, other: &Path) -> Path {
        let mut steps = self.0.clone();
        steps.extend(other.0.iter().cloned());
        Path(steps)
    }

    /// Relative navigation. `.` is a no-op, `..` pops one step; popping past
    /// the root yields `None`. Other segments are parsed as in [`parse`].
    ///
    /// [`parse`]: Path::parse
    pub fn join(&self, relative: &str) -> Option<Path> {
        let mut steps = self.0.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            match segment {
                "." => {}
                ".." => {
                    steps.pop()?;
                }
                other => steps.push(Step::from_segment(other)),
            }
        }
        Some(Path(steps))
    }

    /// Resolves the path against a tree, borrowing the addressed value.
    ///
    /// Objects are entered by own key (an `Index` step matches the decimal
    /// string key), arrays by index. Characters inside a string have no
    /// `&Value` representation, so a step into a string yields `None` here;
    /// use [`lookup`](Path::lookup) when character extraction matters.
    pub fn lookup_ref<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        let mut current = tree;
        for step in &self.0 {
            current = match (step, current) {
                (Step::Key(key), Value::Object(map)) => map.get(key)?,
                (Step::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
                (step, Value::Array(items)) => items.get(step.as_index()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolves the path against a tree, cloning the addressed value.
    ///
    /// Total: any failure yields `None`. A final index step into a string
    /// extracts the addressed character as a one-char string.
    pub fn lookup(&self, tree: &Value) -> Option<Value> {
        let mut current = tree;
        for (position, step) in self.0.iter().enumerate() {
            current = match (step, current) {
                (Step::Key(key), Value::Object(map)) => map.get(key)?,
                (Step::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
                (step, Value::Array(items)) => items.get(step.as_index()?)?,
                (step, Value::String(text)) => {
                    let character = text.chars().nth(step.as_index()?)?;
                    if position + 1 != self.0.len() {
                        return None;
                    }
                    return Some(Value::String(character.to_string()));
                }
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, step) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str("/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

impl From<Vec<Step>> for Path {
    fn from(steps: Vec<Step>) -> Path {
        Path(steps)
    }
}

impl FromIterator<Step> for Path {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Path {
        Path(iter.into_iter().collect())
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Path {
        Path::parse(path)
    }
}
