//! The browser history boundary.
//!
//! # Responsibilities
//! - Read the current pathname and query string
//! - Push or replace location entries
//!
//! # Design Decisions
//! - The controller treats history as an opaque external state store it
//!   reads and writes but does not own; the trait is the seam a host
//!   shell implements over the real browser API
//! - [`MemoryHistory`] is the in-process implementation used headless
//!   and in tests, with an explicit entry stack so back/forward can be
//!   simulated

use std::sync::Mutex;

/// Read/write access to the location the application currently shows.
pub trait History: Send + Sync {
    /// Current pathname, without the query string.
    fn pathname(&self) -> String;

    /// Current query string, without the leading `?`.
    fn search(&self) -> String;

    /// Append a new entry and make it current.
    fn push(&self, url: &str);

    /// Replace the current entry in place.
    fn replace(&self, url: &str);
}

struct MemoryHistoryInner {
    entries: Vec<String>,
    index: usize,
}

/// An in-process history with a real entry stack.
pub struct MemoryHistory {
    inner: Mutex<MemoryHistoryInner>,
}

impl MemoryHistory {
    /// Start with `url` as the only entry.
    pub fn new(url: &str) -> Self {
        Self {
            inner: Mutex::new(MemoryHistoryInner {
                entries: vec![url.to_string()],
                index: 0,
            }),
        }
    }

    /// Move one entry back, like the browser back button.
    ///
    /// Returns false when already at the oldest entry. The caller is
    /// responsible for following up with a route update, exactly as a
    /// `popstate` handler would.
    pub fn back(&self) -> bool {
        let mut inner = self.lock();
        if inner.index == 0 {
            return false;
        }
        inner.index -= 1;
        true
    }

    /// Move one entry forward. Returns false at the newest entry.
    pub fn forward(&self) -> bool {
        let mut inner = self.lock();
        if inner.index + 1 >= inner.entries.len() {
            return false;
        }
        inner.index += 1;
        true
    }

    /// Number of entries on the stack.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// The full current url, `pathname?search`.
    pub fn current_url(&self) -> String {
        let inner = self.lock();
        inner.entries[inner.index].clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryHistoryInner> {
        self.inner.lock().expect("memory history mutex poisoned")
    }
}

impl History for MemoryHistory {
    fn pathname(&self) -> String {
        let url = self.current_url();
        match url.split_once('?') {
            Some((pathname, _)) => pathname.to_string(),
            None => url,
        }
    }

    fn search(&self) -> String {
        let url = self.current_url();
        match url.split_once('?') {
            Some((_, search)) => search.to_string(),
            None => String::new(),
        }
    }

    fn push(&self, url: &str) {
        let mut inner = self.lock();
        let index = inner.index;
        // Pushing drops any forward entries, as the browser does.
        inner.entries.truncate(index + 1);
        inner.entries.push(url.to_string());
        inner.index += 1;
    }

    fn replace(&self, url: &str) {
        let mut inner = self.lock();
        let index = inner.index;
        inner.entries[index] = url.to_string();
    }
}
