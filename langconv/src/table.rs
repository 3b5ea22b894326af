//! Replacement tables
//!
//! A [`ReplacementTable`] maps text into one target variant. Keys are the
//! canonical tokens or phrases found in other variants, values are their
//! spelling in the table's variant. Lookups always take the longest key that
//! matches at a position, so phrase entries win over the single characters
//! they contain.

use crate::variant::VariantCode;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub from: String,
    pub to: String,
    /// The mapping throws information away and can never be reversed by lookup
    pub lossy: bool,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: HashMap<char, usize>,
    entry: Option<usize>,
}

/// Immutable-after-build mapping into a single variant, stored as a char trie.
#[derive(Debug, Clone)]
pub struct ReplacementTable {
    variant: VariantCode,
    nodes: Vec<TrieNode>,
    entries: Vec<Replacement>,
    // Longest key in bytes
    max_key_len: usize,
}

impl ReplacementTable {
    pub fn new(variant: VariantCode) -> Self {
        ReplacementTable {
            variant,
            nodes: vec![TrieNode::default()],
            entries: Vec::new(),
            max_key_len: 0,
        }
    }

    /// Build a table from `(from, to)` pairs
    pub fn from_pairs<I, K, V>(variant: VariantCode, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = ReplacementTable::new(variant);
        for (from, to) in pairs {
            table.insert(from.as_ref(), to.as_ref());
        }
        table
    }

    /// The variant this table converts into
    pub fn variant(&self) -> &VariantCode {
        &self.variant
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Replacement> {
        self.entries.iter()
    }

    /// Byte length of the longest key. A lookup never reads further ahead.
    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    /// Add or overwrite a reversible entry
    pub fn insert(&mut self, from: &str, to: &str) -> &mut Self {
        self.insert_entry(from, to, false)
    }

    /// Add or overwrite an entry flagged as irreversible
    pub fn insert_lossy(&mut self, from: &str, to: &str) -> &mut Self {
        self.insert_entry(from, to, true)
    }

    /// Flag an existing entry as irreversible. Returns false if there is no such key.
    pub fn mark_lossy(&mut self, from: &str) -> bool {
        match self.find_node(from).and_then(|idx| self.nodes[idx].entry) {
            Some(entry) => {
                self.entries[entry].lossy = true;
                true
            }
            None => false,
        }
    }

    fn insert_entry(&mut self, from: &str, to: &str, lossy: bool) -> &mut Self {
        if from.is_empty() {
            warn!(
                "Ignoring empty key in replacement table for {}",
                self.variant
            );
            return self;
        }

        let mut node_idx = 0;
        for ch in from.chars() {
            let next_idx = match self.nodes[node_idx].children.get(&ch) {
                Some(&idx) => idx,
                None => {
                    let new_idx = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node_idx].children.insert(ch, new_idx);
                    new_idx
                }
            };
            node_idx = next_idx;
        }

        self.max_key_len = self.max_key_len.max(from.len());
        let replacement = Replacement {
            from: from.to_string(),
            to: to.to_string(),
            lossy,
        };
        match self.nodes[node_idx].entry {
            Some(existing) => self.entries[existing] = replacement,
            None => {
                self.nodes[node_idx].entry = Some(self.entries.len());
                self.entries.push(replacement);
            }
        }
        self
    }

    fn find_node(&self, key: &str) -> Option<usize> {
        let mut node_idx = 0;
        for ch in key.chars() {
            node_idx = *self.nodes[node_idx].children.get(&ch)?;
        }
        Some(node_idx)
    }

    /// Exact lookup of a key
    pub fn get(&self, from: &str) -> Option<&Replacement> {
        let entry = self.nodes[self.find_node(from)?].entry?;
        Some(&self.entries[entry])
    }

    /// The longest entry whose key is a prefix of `text`
    pub fn longest_match(&self, text: &str) -> Option<&Replacement> {
        let mut node_idx = 0;
        let mut best = None;
        for ch in text.chars() {
            match self.nodes[node_idx].children.get(&ch) {
                Some(&next) => node_idx = next,
                None => break,
            }
            if let Some(entry) = self.nodes[node_idx].entry {
                best = Some(entry);
            }
        }
        best.map(|entry| &self.entries[entry])
    }

    /// The next token of `text`: its byte length and what it becomes.
    /// Text no entry covers is a single char that stays as it is.
    pub fn next_token<'a>(&'a self, text: &'a str) -> (usize, &'a str) {
        match self.longest_match(text) {
            Some(replacement) => (replacement.from.len(), replacement.to.as_str()),
            None => {
                let len = text.chars().next().map_or(0, char::len_utf8);
                (len, &text[..len])
            }
        }
    }

    /// Convert a whole string, left to right with longest match.
    /// Text no entry covers is copied unchanged.
    pub fn replace_all(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut pos = 0;
        while pos < text.len() {
            let (len, to) = self.next_token(&text[pos..]);
            result.push_str(to);
            pos += len;
        }
        result
    }

    /// Derive the reverse table into `variant`.
    ///
    /// Only unambiguous entries survive: when several keys map to the same
    /// value there is no way to tell which one to restore, so that value stays
    /// one-way. Lossy and identity entries are skipped as well.
    pub fn inverted(&self, variant: VariantCode) -> ReplacementTable {
        let mut sources: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut order = Vec::new();
        for entry in self.entries.iter().filter(|e| !e.lossy && e.from != e.to) {
            let candidates = sources.entry(entry.to.as_str()).or_default();
            if candidates.is_empty() {
                order.push(entry.to.as_str());
            }
            candidates.push(entry.from.as_str());
        }

        let mut inverted = ReplacementTable::new(variant);
        let mut ambiguous = 0;
        for to in order {
            match sources[to].as_slice() {
                [only] => {
                    inverted.insert(to, only);
                }
                _ => ambiguous += 1,
            }
        }
        debug!(
            "Inverted {} -> {}: {} entries, {} ambiguous left one-way",
            self.variant,
            inverted.variant,
            inverted.len(),
            ambiguous
        );
        inverted
    }
}
