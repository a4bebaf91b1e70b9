//! Order-preserving, case-insensitive header multimap.

use bytes::Bytes;

use crate::error::{HttpError, Result};
use crate::http::fields;

/// Iteration modes for [`HeaderStore::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterMode {
    /// One entry per distinct name, in first-seen case and position, with
    /// the first value. Values are never joined; use `get_all` for the rest.
    Folded,
    /// Every insertion in original order and case, duplicates included.
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    name: String,
    value: Bytes,
}

/// Header names are compared after ASCII lowercasing; the case given at
/// insertion is kept for serialization. Values are opaque bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderStore {
    entries: Vec<Entry>,
}

impl HeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value, keeping any existing values for the name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        let name = name.into();
        self.entries.push(Entry {
            key: name.to_ascii_lowercase(),
            name,
            value: value.into(),
        });
    }

    /// Replaces every value for the name with a single one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        let name = name.into();
        self.remove_all(&name);
        self.add(name, value);
    }

    /// First value stored for `name`.
    pub fn get(&self, name: &str) -> Result<&[u8]> {
        self.find(name)
            .map(|e| e.value.as_ref())
            .ok_or_else(|| HttpError::KeyNotFound(name.to_string()))
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a [u8]) -> &'a [u8] {
        self.find(name).map(|e| e.value.as_ref()).unwrap_or(default)
    }

    /// First value as text, when it is valid UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.find(name).and_then(|e| std::str::from_utf8(&e.value).ok())
    }

    pub fn get_all(&self, name: &str) -> Vec<&[u8]> {
        let key = name.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|e| e.key == key)
            .map(|e| e.value.as_ref())
            .collect()
    }

    /// Removes every value for `name`, returning how many were removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let key = name.to_ascii_lowercase();
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        before - self.entries.len()
    }

    /// Removes the most recently added value for `name`.
    pub fn remove_last(&mut self, name: &str) -> Option<(String, Bytes)> {
        let key = name.to_ascii_lowercase();
        let idx = self.entries.iter().rposition(|e| e.key == key)?;
        let entry = self.entries.remove(idx);
        Some((entry.name, entry.value))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Name and value of the entry inserted last, if any.
    pub fn last(&self) -> Option<(&str, &[u8])> {
        self.entries
            .last()
            .map(|e| (e.name.as_str(), e.value.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self, mode: IterMode) -> Iter<'_> {
        Iter {
            store: self,
            pos: 0,
            mode,
        }
    }

    /// Adds a value, comma-joining it onto an existing one when the header
    /// is classified as foldable.
    pub fn append_folded(&mut self, name: &str, value: &[u8]) {
        if !fields::is_foldable(name) {
            self.add(name, Bytes::copy_from_slice(value));
            return;
        }
        let key = name.to_ascii_lowercase();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                let mut joined = Vec::with_capacity(entry.value.len() + 2 + value.len());
                joined.extend_from_slice(&entry.value);
                joined.extend_from_slice(b", ");
                joined.extend_from_slice(value);
                entry.value = Bytes::from(joined);
            }
            None => self.add(name, Bytes::copy_from_slice(value)),
        }
    }

    /// True when any comma-separated element of any value matches `token`
    /// case-insensitively.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).iter().any(|v| {
            v.split(|&b| b == b',')
                .any(|t| trim(t).eq_ignore_ascii_case(token.as_bytes()))
        })
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        let key = name.to_ascii_lowercase();
        self.entries.iter().find(|e| e.key == key)
    }
}

fn trim(mut s: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = s {
        s = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = s {
        s = rest;
    }
    s
}

/// Iterator returned by [`HeaderStore::iter`].
pub struct Iter<'a> {
    store: &'a HeaderStore,
    pos: usize,
    mode: IterMode,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let entries = &self.store.entries;
        while self.pos < entries.len() {
            let idx = self.pos;
            self.pos += 1;
            let entry = &entries[idx];
            if self.mode == IterMode::Folded && entries[..idx].iter().any(|e| e.key == entry.key) {
                continue;
            }
            return Some((entry.name.as_str(), entry.value.as_ref()));
        }
        None
    }
}

impl<N: Into<String>, V: Into<Bytes>> FromIterator<(N, V)> for HeaderStore {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut store = HeaderStore::new();
        store.extend(iter);
        store
    }
}

impl<N: Into<String>, V: Into<Bytes>> Extend<(N, V)> for HeaderStore {
    fn extend<I: IntoIterator<Item = (N, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.add(name, value);
        }
    }
}
