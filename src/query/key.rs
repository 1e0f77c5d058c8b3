//! Cache key identity.
//!
//! # Design Decisions
//! - A key is an ordered sequence of JSON values; identity is the
//!   canonical JSON serialization of that array, so order and arity are
//!   part of the identity
//! - Structural prefix matching works on the serialized form: the
//!   serialization of `["users"]` minus its closing bracket is a literal
//!   string prefix of the serialization of `["users", 1]` but not of
//!   `["users-archive"]` (the closing quote guards segment boundaries)

use serde::Serialize;
use serde_json::Value;

/// Canonical identity for a cached fetch result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<Value>);

impl QueryKey {
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// The canonical serialized form used as cache identity.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).expect("in-memory JSON values always serialize")
    }

    /// Literal string prefix matching every key this key is a
    /// structural prefix of.
    pub(crate) fn prefix_pattern(&self) -> String {
        let mut pattern = self.canonical();
        pattern.pop();
        pattern
    }

    // Macro plumbing: `query_key!` hands its parts to `json!` as one
    // array, which always produces `Value::Array`.
    #[doc(hidden)]
    pub fn from_json_array(value: Value) -> Self {
        match value {
            Value::Array(parts) => Self(parts),
            other => Self(vec![other]),
        }
    }
}

impl From<Vec<Value>> for QueryKey {
    fn from(parts: Vec<Value>) -> Self {
        Self(parts)
    }
}

impl FromIterator<Value> for QueryKey {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Build a [`QueryKey`] from heterogeneous parts.
///
/// Parts follow `serde_json::json!` grammar, so object and array
/// literals work inline:
///
/// ```
/// use spa_runtime::query_key;
///
/// let key = query_key!["users", 42, true];
/// assert_eq!(key.canonical(), r#"["users",42,true]"#);
///
/// let filtered = query_key!["users", { "page": 2 }];
/// assert_eq!(filtered.canonical(), r#"["users",{"page":2}]"#);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($parts:tt)*) => {
        $crate::query::QueryKey::from_json_array($crate::__serde_json::json!([$($parts)*]))
    };
}
