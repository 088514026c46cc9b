//! Ordered, deduplicating id sets.
//!
//! Query workers build one `IdSet` per filter; the collector combines
//! them by intersection. Each entry carries the encoded value every
//! contributing index saw for that id, keyed by selector hash, so
//! ordering by a filtered-on selector needs no second scan.

use crate::selector::SelectorHash;
use std::collections::HashMap;

/// One record id with its per-selector indexed-value annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdEntry {
    /// The record id.
    pub id: String,
    /// Encoded indexed value per contributing selector.
    pub values: HashMap<SelectorHash, Vec<u8>>,
}

impl IdEntry {
    /// Creates an entry annotated with one selector's value.
    #[must_use]
    pub fn new(id: impl Into<String>, selector: SelectorHash, value: Vec<u8>) -> Self {
        let mut values = HashMap::with_capacity(1);
        values.insert(selector, value);
        Self {
            id: id.into(),
            values,
        }
    }
}

/// An ordered, deduplicating collection of [`IdEntry`].
///
/// Entries stay sorted by id through `add`, `union` and `intersect`;
/// `order_by` re-sorts by an annotated value and must come last.
#[derive(Debug, Clone, Default)]
pub struct IdSet {
    entries: Vec<IdEntry>,
    truncated: bool,
}

impl IdSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set holds no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a range scan stopped early at the internal query limit.
    /// A truncated set may be missing matching ids.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Marks the set truncated.
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    /// The entries in their current order.
    #[must_use]
    pub fn entries(&self) -> &[IdEntry] {
        &self.entries
    }

    /// Iterates the ids in their current order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    /// Adds an entry, merging annotations when the id is already
    /// present.
    pub fn add(&mut self, entry: IdEntry) {
        match self.entries.binary_search_by(|e| e.id.cmp(&entry.id)) {
            Ok(pos) => {
                self.entries[pos].values.extend(entry.values);
            }
            Err(pos) => {
                self.entries.insert(pos, entry);
            }
        }
    }

    /// Merges another set into this one.
    pub fn union(&mut self, other: IdSet) {
        self.truncated |= other.truncated;
        for entry in other.entries {
            self.add(entry);
        }
    }

    /// Retains only ids present in both sets, merging annotations for
    /// the survivors.
    #[must_use]
    pub fn intersect(self, other: IdSet) -> IdSet {
        let truncated = self.truncated || other.truncated;
        let mut merged = Vec::with_capacity(self.entries.len().min(other.entries.len()));

        let mut right = other.entries.into_iter().peekable();
        for mut entry in self.entries {
            loop {
                match right.peek() {
                    Some(r) if r.id < entry.id => {
                        right.next();
                    }
                    Some(r) if r.id == entry.id => {
                        let r = right.next().expect("peeked entry");
                        entry.values.extend(r.values);
                        merged.push(entry);
                        break;
                    }
                    _ => break,
                }
            }
        }

        IdSet {
            entries: merged,
            truncated,
        }
    }

    /// Copies the annotation for `selector` from `other` onto matching
    /// ids in this set. Used by the ordering fallback scan.
    pub fn annotate_from(&mut self, other: &IdSet, selector: SelectorHash) {
        let lookup: HashMap<&str, &Vec<u8>> = other
            .entries
            .iter()
            .filter_map(|e| e.values.get(&selector).map(|v| (e.id.as_str(), v)))
            .collect();
        for entry in &mut self.entries {
            if let Some(value) = lookup.get(entry.id.as_str()) {
                entry
                    .values
                    .entry(selector)
                    .or_insert_with(|| (*value).clone());
            }
        }
    }

    /// Stable sort by the encoded value annotated for `selector`.
    ///
    /// Entries lacking the annotation sort last regardless of
    /// direction; equal values are broken by ascending id for
    /// determinism.
    pub fn order_by(&mut self, selector: SelectorHash, ascending: bool) {
        self.entries.sort_by(|a, b| {
            match (a.values.get(&selector), b.values.get(&selector)) {
                (Some(va), Some(vb)) => {
                    let ord = if ascending { va.cmp(vb) } else { vb.cmp(va) };
                    ord.then_with(|| a.id.cmp(&b.id))
                }
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.id.cmp(&b.id),
            }
        });
    }

    /// Slices the set to the paging window.
    pub fn paginate(&mut self, offset: usize, limit: usize) {
        if offset >= self.entries.len() {
            self.entries.clear();
            return;
        }
        self.entries.drain(..offset);
        self.entries.truncate(limit);
    }
}
