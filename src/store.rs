//! PreferenceStore - the in-memory key/value/comment structure.
//!
//! Holds:
//! - values: unique key -> canonical text
//! - key order: first-seen order, used only to lay the file out again
//! - comments: text that sat above a key in the file
//! - end comment: trailing text after the last key
//!
//! The store itself is not synchronized; [`crate::Preferences`] wraps it in a
//! single mutex so each call observes and leaves a consistent state.

use std::collections::HashMap;

/// One entry as laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub comment: Option<&'a str>,
}

/// Ordered, unique-keyed preference map with comment preservation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceStore {
    values: HashMap<String, String>,
    order: Vec<String>,
    comments: HashMap<String, String>,
    end_comment: String,
}

impl PreferenceStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries in the store.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in file/insertion order.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Insert or overwrite a value.
    ///
    /// An existing key keeps its position; a new key is appended.
    /// Returns the previous value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        let previous = self.values.insert(key.to_string(), value.into());
        if previous.is_none() {
            self.order.push(key.to_string());
        }
        previous
    }

    /// Remove a key, its position and its comment.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let previous = self.values.remove(key)?;
        self.order.retain(|k| k != key);
        self.comments.remove(key);
        Some(previous)
    }

    /// Drop every entry and comment.
    pub fn clear(&mut self) {
        self.values.clear();
        self.order.clear();
        self.comments.clear();
        self.end_comment.clear();
    }

    pub fn comment(&self, key: &str) -> Option<&str> {
        self.comments.get(key).map(String::as_str)
    }

    /// Attach comment text to an existing key.
    ///
    /// The text is written verbatim above the key, so it should carry its own
    /// comment markers and line terminators. Returns false if the key is absent.
    pub fn set_comment(&mut self, key: &str, text: impl Into<String>) -> bool {
        if !self.values.contains_key(key) {
            return false;
        }
        let text = text.into();
        if text.is_empty() {
            self.comments.remove(key);
        } else {
            self.comments.insert(key.to_string(), text);
        }
        true
    }

    /// Append comment text to an existing key's comment.
    pub(crate) fn append_comment(&mut self, key: &str, text: &str) {
        if text.is_empty() || !self.values.contains_key(key) {
            return;
        }
        self.comments
            .entry(key.to_string())
            .or_default()
            .push_str(text);
    }

    pub fn end_comment(&self) -> &str {
        &self.end_comment
    }

    pub fn set_end_comment(&mut self, text: impl Into<String>) {
        self.end_comment = text.into();
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = EntryRef<'_>> {
        self.order.iter().filter_map(move |key| {
            self.values.get(key).map(|value| EntryRef {
                key,
                value,
                comment: self.comment(key),
            })
        })
    }
}
