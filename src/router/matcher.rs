//! Route pattern matching.
//!
//! # Responsibilities
//! - Register path patterns with static and `:name` parameter segments
//! - Resolve a concrete path to at most one registered pattern
//! - Extract parameter values from the matched path
//!
//! # Design Decisions
//! - Segment trie; a static child always outranks the parameter child at
//!   the same depth, with backtracking into the parameter branch
//! - No regex to guarantee O(segments) matching
//! - Duplicate pattern registration keeps the first payload
//! - `""` and `"/"` are distinct patterns and never alias

use std::collections::HashMap;

struct ParamEdge<P> {
    name: String,
    node: Box<Node<P>>,
}

struct Node<P> {
    statics: HashMap<String, Node<P>>,
    param: Option<ParamEdge<P>>,
    payload: Option<P>,
}

impl<P> Default for Node<P> {
    fn default() -> Self {
        Self {
            statics: HashMap::new(),
            param: None,
            payload: None,
        }
    }
}

/// Trie over route path patterns.
///
/// Patterns are inserted once at construction time; lookup is read-only
/// and deterministic for a given set of registrations.
pub struct PathMatcher<P> {
    root: Node<P>,
    /// Payload registered under the empty pattern, kept apart from `/`.
    empty: Option<P>,
}

impl<P> PathMatcher<P> {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            empty: None,
        }
    }

    /// Register `pattern` with its payload.
    ///
    /// Segments starting with `:` match any single segment and capture it
    /// under the name that follows the colon.
    pub fn insert(&mut self, pattern: &str, payload: P) {
        if pattern.is_empty() {
            if self.empty.is_none() {
                self.empty = Some(payload);
            }
            return;
        }

        let mut node = &mut self.root;
        for segment in pattern.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = segment.strip_prefix(':') {
                let edge = node.param.get_or_insert_with(|| ParamEdge {
                    name: name.to_string(),
                    node: Box::new(Node::default()),
                });
                node = &mut edge.node;
            } else {
                node = node.statics.entry(segment.to_string()).or_default();
            }
        }
        // First registration wins on conflicting patterns.
        if node.payload.is_none() {
            node.payload = Some(payload);
        }
    }

    /// Resolve `path` to a registered payload plus extracted parameters.
    pub fn lookup(&self, path: &str) -> Option<(&P, HashMap<String, String>)> {
        if path.is_empty() {
            return self.empty.as_ref().map(|payload| (payload, HashMap::new()));
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut captured = Vec::new();
        let payload = Self::descend(&self.root, &segments, &mut captured)?;
        Some((payload, captured.into_iter().collect()))
    }

    fn descend<'a>(
        node: &'a Node<P>,
        segments: &[&str],
        captured: &mut Vec<(String, String)>,
    ) -> Option<&'a P> {
        let Some((head, rest)) = segments.split_first() else {
            return node.payload.as_ref();
        };

        if let Some(next) = node.statics.get(*head) {
            if let Some(payload) = Self::descend(next, rest, captured) {
                return Some(payload);
            }
        }

        if let Some(edge) = &node.param {
            captured.push((edge.name.clone(), (*head).to_string()));
            if let Some(payload) = Self::descend(&edge.node, rest, captured) {
                return Some(payload);
            }
            captured.pop();
        }

        None
    }
}

impl<P> Default for PathMatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> PathMatcher<String> {
        let mut m = PathMatcher::new();
        for p in patterns {
            m.insert(p, p.to_string());
        }
        m
    }

    #[test]
    fn test_static_match() {
        let m = matcher(&["/", "/about"]);

        let (payload, params) = m.lookup("/about").unwrap();
        assert_eq!(payload, "/about");
        assert!(params.is_empty());

        let (payload, _) = m.lookup("/").unwrap();
        assert_eq!(payload, "/");
    }

    #[test]
    fn test_param_extraction() {
        let m = matcher(&["/user/:id", "/user/:id/posts"]);

        let (payload, params) = m.lookup("/user/123").unwrap();
        assert_eq!(payload, "/user/:id");
        assert_eq!(params["id"], "123");

        let (payload, params) = m.lookup("/user/456/posts").unwrap();
        assert_eq!(payload, "/user/:id/posts");
        assert_eq!(params["id"], "456");
    }

    #[test]
    fn test_param_value_is_raw_segment_text() {
        let m = matcher(&["/user/:id/posts"]);
        let (_, params) = m.lookup("/user/user-123_test/posts").unwrap();
        assert_eq!(params["id"], "user-123_test");
    }

    #[test]
    fn test_static_outranks_param() {
        let m = matcher(&["/user/:id", "/user/me"]);

        let (payload, params) = m.lookup("/user/me").unwrap();
        assert_eq!(payload, "/user/me");
        assert!(params.is_empty());

        let (payload, _) = m.lookup("/user/42").unwrap();
        assert_eq!(payload, "/user/:id");
    }

    #[test]
    fn test_backtracks_into_param_branch() {
        // `/files/special` is a dead end for `/files/special/x`; the
        // matcher must back out and retry through `:name`.
        let m = matcher(&["/files/special", "/files/:name/raw"]);

        let (payload, params) = m.lookup("/files/special/raw").unwrap();
        assert_eq!(payload, "/files/:name/raw");
        assert_eq!(params["name"], "special");
    }

    #[test]
    fn test_no_match() {
        let m = matcher(&["/about", "/user/:id"]);
        assert!(m.lookup("/nonexistent").is_none());
        assert!(m.lookup("/user").is_none());
        assert!(m.lookup("/user/1/extra").is_none());
    }

    #[test]
    fn test_root_and_empty_are_distinct() {
        let mut m = PathMatcher::new();
        m.insert("/", "root".to_string());

        assert!(m.lookup("").is_none());
        assert_eq!(m.lookup("/").unwrap().0, "root");

        m.insert("", "empty".to_string());
        assert_eq!(m.lookup("").unwrap().0, "empty");
    }

    #[test]
    fn test_duplicate_pattern_first_wins() {
        let mut m = PathMatcher::new();
        m.insert("/a", "first".to_string());
        m.insert("/a", "second".to_string());
        assert_eq!(m.lookup("/a").unwrap().0, "first");
    }
}
