//! Structural type classification for tree values.

use serde_json::Value;
use std::fmt;

/// The closed set of structural kinds a location in a tree can have.
///
/// `None` is the absent sentinel: it classifies both a missing location and
/// an explicit JSON `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Dict,
    List,
    Text,
    Numb,
    Bool,
    None,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Dict => "dict",
            ValueKind::List => "list",
            ValueKind::Text => "text",
            ValueKind::Numb => "numb",
            ValueKind::Bool => "bool",
            ValueKind::None => "none",
        })
    }
}

/// Classifies a value by structural inspection; never declared, never fails.
pub fn kind_of(value: Option<&Value>) -> ValueKind {
    match value {
        Some(Value::Object(_)) => ValueKind::Dict,
        Some(Value::Array(_)) => ValueKind::List,
        Some(Value::String(_)) => ValueKind::Text,
        Some(Value::Number(_)) => ValueKind::Numb,
        Some(Value::Bool(_)) => ValueKind::Bool,
        Some(Value::Null) | None => ValueKind::None,
    }
}

/// Whether a value may be written into a document through the model layer.
///
/// `null` is rejected: it denotes absence on the wire and has no structural
/// kind of its own.
pub fn is_valid_value(value: &Value) -> bool {
    !value.is_null()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_by_structure() {
        assert_eq!(kind_of(Some(&json!({}))), ValueKind::Dict);
        assert_eq!(kind_of(Some(&json!([1]))), ValueKind::List);
        assert_eq!(kind_of(Some(&json!("x"))), ValueKind::Text);
        assert_eq!(kind_of(Some(&json!(3.5))), ValueKind::Numb);
        assert_eq!(kind_of(Some(&json!(false))), ValueKind::Bool);
        assert_eq!(kind_of(Some(&json!(null))), ValueKind::None);
        assert_eq!(kind_of(None), ValueKind::None);
    }

    #[test]
    fn display_tags() {
        assert_eq!(ValueKind::Dict.to_string(), "dict");
        assert_eq!(ValueKind::None.to_string(), "none");
    }
}
