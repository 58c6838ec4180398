//! Ordered attribute overrides layered over selections.
//!
//! The effective attributes of a cell are the defaults with every matching
//! entry applied in insertion order, so later entries win. Lookups are
//! memoized per cell and per table; every mutation drops both memos.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::attributes::{AttributeDiff, CellAttributes};
use crate::error::AttributeTypeError;
use crate::key::CellKey;
use crate::selection::Selection;

/// One override: attributes in `diff` apply to `selection` on `table`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayEntry {
    pub selection: Selection,
    pub table: usize,
    pub diff: AttributeDiff,
}

impl OverlayEntry {
    pub fn new(selection: Selection, table: usize, diff: AttributeDiff) -> Self {
        Self {
            selection,
            table,
            diff,
        }
    }

    fn sets_merge_area(&self) -> bool {
        self.diff.merge_area.is_some()
    }
}

/// What [`AttributeOverlay::append`] changed, enough to undo it exactly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppendOutcome {
    /// Entries dropped by the merge-area rule, with their former indices in
    /// ascending order.
    pub removed: Vec<(usize, OverlayEntry)>,
    /// Whether the new entry was stored.
    pub appended: bool,
}

/// Overlay shared between the grid and the evaluator.
pub type SharedOverlay = Arc<RwLock<AttributeOverlay>>;

#[derive(Debug, Default)]
pub struct AttributeOverlay {
    entries: Vec<OverlayEntry>,
    /// Per-cell memo tagged with the overlay length it was computed at.
    attr_cache: DashMap<CellKey, (usize, CellAttributes)>,
    /// Entries grouped by table.
    table_cache: DashMap<usize, Vec<(Selection, AttributeDiff)>>,
}

impl Clone for AttributeOverlay {
    fn clone(&self) -> Self {
        Self::from_entries(self.entries.clone())
    }
}

impl PartialEq for AttributeOverlay {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl AttributeOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<OverlayEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[OverlayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&OverlayEntry> {
        self.entries.last()
    }

    fn invalidate(&self) {
        self.attr_cache.clear();
        self.table_cache.clear();
    }

    /// Append an entry.
    ///
    /// When the entry sets `merge_area`, earlier entries with the same
    /// selection and table that also set `merge_area` are removed first, and
    /// the new entry is only stored if its merge area is not null.
    pub fn append(&mut self, entry: OverlayEntry) -> Result<AppendOutcome, AttributeTypeError> {
        entry.diff.validate()?;

        let mut outcome = AppendOutcome::default();
        if entry.sets_merge_area() {
            let mut index = 0;
            let mut kept = Vec::with_capacity(self.entries.len());
            for existing in self.entries.drain(..) {
                if existing.sets_merge_area()
                    && existing.selection == entry.selection
                    && existing.table == entry.table
                {
                    outcome.removed.push((index, existing));
                } else {
                    kept.push(existing);
                }
                index += 1;
            }
            self.entries = kept;
            if matches!(entry.diff.merge_area, Some(Some(_))) {
                self.entries.push(entry);
                outcome.appended = true;
            }
        } else {
            self.entries.push(entry);
            outcome.appended = true;
        }

        self.invalidate();
        Ok(outcome)
    }

    /// Exact inverse of the [`append`](Self::append) that produced `outcome`.
    pub fn revert_append(&mut self, outcome: &AppendOutcome) {
        if outcome.appended {
            self.entries.pop();
        }
        for (index, entry) in &outcome.removed {
            let index = (*index).min(self.entries.len());
            self.entries.insert(index, entry.clone());
        }
        self.invalidate();
    }

    /// Effective attributes of `key`.
    pub fn lookup(&self, key: &CellKey) -> CellAttributes {
        if let Some(cached) = self.attr_cache.get(key) {
            let (cached_len, attrs) = cached.value();
            if *cached_len == self.entries.len() {
                return attrs.clone();
            }
        }

        if self.table_cache_len() != self.entries.len() {
            self.rebuild_table_cache();
        }

        let mut attrs = CellAttributes::default();
        if let Some(table_entries) = self.table_cache.get(&key.table) {
            for (selection, diff) in table_entries.iter() {
                if selection.contains_key(key) {
                    attrs.apply(diff);
                }
            }
        }

        self.attr_cache
            .insert(*key, (self.entries.len(), attrs.clone()));
        attrs
    }

    fn table_cache_len(&self) -> usize {
        self.table_cache.iter().map(|entry| entry.value().len()).sum()
    }

    fn rebuild_table_cache(&self) {
        self.table_cache.clear();
        for entry in &self.entries {
            self.table_cache
                .entry(entry.table)
                .or_default()
                .push((entry.selection.clone(), entry.diff.clone()));
        }
    }

    /// Top-left key of the first merge area covering `key`, if any.
    pub fn get_merging_cell(&self, key: &CellKey) -> Option<CellKey> {
        self.entries
            .iter()
            .filter(|entry| entry.table == key.table)
            .filter_map(|entry| entry.diff.merge_area.flatten())
            .find(|area| area.contains(key.row, key.column))
            .map(|area| area.anchor(key.table))
    }

    /// Entries of a single table, in order.
    pub fn for_table(&self, table: usize) -> AttributeOverlay {
        Self::from_entries(
            self.entries
                .iter()
                .filter(|entry| entry.table == table)
                .cloned()
                .collect(),
        )
    }

    /// Replace the entry at `index`, returning the old one.
    pub fn replace(&mut self, index: usize, entry: OverlayEntry) -> Option<OverlayEntry> {
        let slot = self.entries.get_mut(index)?;
        let old = std::mem::replace(slot, entry);
        self.invalidate();
        Some(old)
    }

    pub fn insert_at(&mut self, index: usize, entry: OverlayEntry) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
        self.invalidate();
    }

    pub fn pop(&mut self) -> Option<OverlayEntry> {
        let entry = self.entries.pop();
        self.invalidate();
        entry
    }

    /// Remove the last entry equal to `entry`, returning its index.
    pub fn remove_entry(&mut self, entry: &OverlayEntry) -> Option<usize> {
        let index = self.entries.iter().rposition(|existing| existing == entry)?;
        self.entries.remove(index);
        self.invalidate();
        Some(index)
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        self.invalidate();
    }

    /// Swap in a whole entry list, returning the previous one.
    pub fn restore(&mut self, entries: Vec<OverlayEntry>) -> Vec<OverlayEntry> {
        let old = std::mem::replace(&mut self.entries, entries);
        self.invalidate();
        old
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.invalidate();
    }

    /// Rewrite entries in place. `f` returns `false` to drop an entry.
    pub fn retain_map<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut OverlayEntry) -> bool,
    {
        self.entries.retain_mut(|entry| f(entry));
        self.invalidate();
    }
}
