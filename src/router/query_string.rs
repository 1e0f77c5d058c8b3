//! Query-string access and patching.
//!
//! # Responsibilities
//! - Parse the location's query string into ordered key/value pairs
//! - Expose read access (get / get_all / has / entries)
//! - Apply merge patches: set, set-repeated, remove
//!
//! # Design Decisions
//! - Pair order is preserved so serialization is deterministic
//! - Setting a single value replaces the first occurrence in place and
//!   drops later duplicates; setting a list removes all occurrences and
//!   appends at the end
//! - Encoding and decoding go through `form_urlencoded`, never by hand

use std::fmt;
use url::form_urlencoded;

/// A patch applied to one query-string key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamPatch {
    /// Set the key to a single value.
    Value(String),
    /// Set the key to repeated values, replacing any prior ones.
    Values(Vec<String>),
    /// Delete the key entirely.
    Remove,
}

impl From<&str> for ParamPatch {
    fn from(value: &str) -> Self {
        ParamPatch::Value(value.to_string())
    }
}

impl From<String> for ParamPatch {
    fn from(value: String) -> Self {
        ParamPatch::Value(value)
    }
}

impl From<Vec<String>> for ParamPatch {
    fn from(values: Vec<String>) -> Self {
        ParamPatch::Values(values)
    }
}

impl From<Vec<&str>> for ParamPatch {
    fn from(values: Vec<&str>) -> Self {
        ParamPatch::Values(values.iter().map(|v| v.to_string()).collect())
    }
}

/// Decoded view over a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Decode `search`, with or without its leading `?`.
    pub fn parse(search: &str) -> Self {
        let trimmed = search.strip_prefix('?').unwrap_or(search);
        Self {
            pairs: form_urlencoded::parse(trimmed.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// All key/value pairs in order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Apply one patch for `key`.
    pub fn apply(&mut self, key: &str, patch: &ParamPatch) {
        match patch {
            ParamPatch::Value(value) => self.set(key, value),
            ParamPatch::Values(values) => {
                self.delete(key);
                for value in values {
                    self.pairs.push((key.to_string(), value.clone()));
                }
            }
            ParamPatch::Remove => self.delete(key),
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(first) => {
                self.pairs[first].1 = value.to_string();
                let mut index = 0;
                self.pairs.retain(|(k, _)| {
                    let keep = k != key || index <= first;
                    index += 1;
                    keep
                });
            }
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    fn delete(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let serialized = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.pairs)
            .finish();
        f.write_str(&serialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_read() {
        let params = QueryParams::parse("?search=foo&page=2&tags=a&tags=b");

        assert_eq!(params.get("search"), Some("foo"));
        assert_eq!(params.get("page"), Some("2"));
        assert_eq!(params.get("nonexistent"), None);
        assert_eq!(params.get_all("tags"), vec!["a", "b"]);
        assert!(params.has("search"));
        assert!(!params.has("nonexistent"));
        assert_eq!(params.to_string(), "search=foo&page=2&tags=a&tags=b");
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut params = QueryParams::parse("a=1&b=2&a=3");
        params.apply("a", &ParamPatch::Value("9".into()));

        // First occurrence keeps its position, duplicates are dropped.
        assert_eq!(params.to_string(), "a=9&b=2");
    }

    #[test]
    fn test_remove_deletes_all_values() {
        let mut params = QueryParams::parse("tags=a&tags=b&page=2");
        params.apply("tags", &ParamPatch::Remove);
        assert_eq!(params.to_string(), "page=2");
    }

    #[test]
    fn test_values_replace_then_append() {
        let mut params = QueryParams::parse("tags=x&page=1");
        params.apply("tags", &ParamPatch::Values(vec!["a".into(), "b".into()]));
        assert_eq!(params.to_string(), "page=1&tags=a&tags=b");
    }

    #[test]
    fn test_display_round_trips_encoding() {
        let params = QueryParams::parse("q=a%20b&note=x%26y");
        assert_eq!(params.get("q"), Some("a b"));
        assert_eq!(params.get("note"), Some("x&y"));
        assert_eq!(QueryParams::parse(&params.to_string()), params);
    }
}
