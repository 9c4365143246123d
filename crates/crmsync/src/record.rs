//! Source-system record identifiers.
//!
//! Catalog records carry numeric ids; event-log records carry opaque string
//! ids. The id kind is a closed, per-type property, so the two variants live
//! in one enum with explicit coercions instead of a generic parameter
//! threading through every layer.

use std::fmt;

use serde_json::Value;

/// Which id representation an entity type uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Int,
    Str,
}

/// A record's identity as assigned by the source system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Coerce a JSON `id` field into the expected kind.
    ///
    /// Numbers are accepted for string ids (stringified) and numeric strings
    /// for integer ids (parsed); anything else is unusable.
    #[must_use]
    pub fn from_json(value: &Value, kind: IdKind) -> Option<RecordId> {
        match kind {
            IdKind::Int => match value {
                Value::Number(n) => n.as_i64().map(RecordId::Int),
                Value::String(s) => s.trim().parse().ok().map(RecordId::Int),
                _ => None,
            },
            IdKind::Str => match value {
                Value::Number(n) => Some(RecordId::Str(n.to_string())),
                Value::String(s) if !s.is_empty() => Some(RecordId::Str(s.clone())),
                _ => None,
            },
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RecordId::Int(id) => Some(*id),
            RecordId::Str(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordId::Int(_) => None,
            RecordId::Str(id) => Some(id),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Str(id) => write!(f, "{id}"),
        }
    }
}

/// One record as pulled off the wire: identity, verbatim payload, and the
/// page it arrived on.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub id: RecordId,
    pub raw: String,
    pub page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_ids_accept_numbers_and_numeric_strings() {
        assert_eq!(
            RecordId::from_json(&json!(42), IdKind::Int),
            Some(RecordId::Int(42))
        );
        assert_eq!(
            RecordId::from_json(&json!("42"), IdKind::Int),
            Some(RecordId::Int(42))
        );
        assert_eq!(RecordId::from_json(&json!("abc"), IdKind::Int), None);
        assert_eq!(RecordId::from_json(&json!(null), IdKind::Int), None);
        assert_eq!(RecordId::from_json(&json!(1.5), IdKind::Int), None);
    }

    #[test]
    fn string_ids_accept_strings_and_stringify_numbers() {
        assert_eq!(
            RecordId::from_json(&json!("ev-01"), IdKind::Str),
            Some(RecordId::Str("ev-01".to_string()))
        );
        assert_eq!(
            RecordId::from_json(&json!(7), IdKind::Str),
            Some(RecordId::Str("7".to_string()))
        );
        assert_eq!(RecordId::from_json(&json!(""), IdKind::Str), None);
        assert_eq!(RecordId::from_json(&json!(null), IdKind::Str), None);
    }

    #[test]
    fn display_renders_both_kinds_bare() {
        assert_eq!(RecordId::Int(5).to_string(), "5");
        assert_eq!(RecordId::Str("ev-5".to_string()).to_string(), "ev-5");
    }
}
