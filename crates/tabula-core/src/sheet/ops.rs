//! Shape changes, structural edits and frozen cells.

use std::collections::BTreeMap;

use super::Sheet;
use crate::error::Result;
use crate::grid::{Discarded, SizeMap};
use tabula_engine::attributes::AttributeDiff;
use tabula_engine::engine::CellResult;
use tabula_engine::{AppendOutcome, Axis, CellKey, OverlayEntry, Selection, Shape};

impl Sheet {
    pub fn shape(&self) -> Shape {
        self.grid.shape()
    }

    /// Reshape the grid. Everything outside the new shape is dropped and
    /// returned.
    pub fn set_shape(&mut self, shape: Shape) -> Result<Discarded> {
        let discarded = self.grid.set_shape(shape)?;
        self.structure_changed();
        Ok(discarded)
    }

    /// Put back a shape and what [`set_shape`](Self::set_shape) discarded.
    pub fn restore_shape(&mut self, shape: Shape, discarded: &Discarded) -> Result<()> {
        self.grid.restore_shape(shape, discarded)?;
        self.structure_changed();
        Ok(())
    }

    /// Insert `count` rows, columns or tables before `point`.
    ///
    /// Row and column inserts keep the shape and return the code of cells
    /// pushed past its edge; table inserts grow the shape.
    pub fn insert(
        &mut self,
        point: i64,
        count: usize,
        axis: Axis,
        table: Option<usize>,
    ) -> Result<BTreeMap<CellKey, String>> {
        if axis == Axis::Table {
            self.insert_tables(point, count)?;
            return Ok(BTreeMap::new());
        }
        let removed = self.grid.insert(point, count, axis, table)?;
        self.structure_changed();
        Ok(removed)
    }

    /// Delete `count` rows, columns or tables starting at `point`, returning
    /// the code of the deleted cells.
    pub fn delete(
        &mut self,
        point: i64,
        count: usize,
        axis: Axis,
        table: Option<usize>,
    ) -> Result<BTreeMap<CellKey, String>> {
        if axis == Axis::Table {
            return self.delete_tables(point, count);
        }
        let removed = self.grid.delete(point, count, axis, table)?;
        self.structure_changed();
        Ok(removed)
    }

    pub fn insert_tables(&mut self, point: i64, count: usize) -> Result<()> {
        self.grid.insert_tables(point, count)?;
        self.structure_changed();
        Ok(())
    }

    pub fn delete_tables(&mut self, point: i64, count: usize) -> Result<BTreeMap<CellKey, String>> {
        let removed = self.grid.delete_tables(point, count)?;
        self.structure_changed();
        Ok(removed)
    }

    fn structure_changed(&self) {
        self.evaluator.set_shape(self.grid.shape());
    }

    /// Write code back without the merge-area check, e.g. when undoing.
    pub(crate) fn restore_cells(&mut self, cells: &BTreeMap<CellKey, String>) {
        for (key, code) in cells {
            self.grid.store(*key, Some(code.as_str()));
        }
        self.evaluator.clear_results();
    }

    pub(crate) fn replace_overlay(&mut self, entries: Vec<OverlayEntry>) -> Vec<OverlayEntry> {
        self.grid.attributes_mut().restore(entries)
    }

    /// Swap both size maps, returning the previous (row heights, column widths).
    pub(crate) fn replace_sizes(&mut self, row_heights: SizeMap, col_widths: SizeMap) -> (SizeMap, SizeMap) {
        (
            self.grid.replace_row_heights(row_heights),
            self.grid.replace_col_widths(col_widths),
        )
    }

    /// Capture the value of `key` and mark it frozen.
    ///
    /// Returns the snapshot that was replaced, if any, and the overlay change.
    pub fn freeze(&mut self, key: CellKey) -> Result<(Option<CellResult>, AppendOutcome)> {
        self.check(key)?;
        let previous = self.evaluator.take_frozen(&key);
        if let Some(result) = self.evaluator.value(key) {
            self.evaluator.store_frozen(key, result);
        }
        let outcome = self.append_attributes(frozen_entry(key, true));
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.restore_frozen(key, previous);
                return Err(err);
            }
        };
        self.evaluator.clear_results();
        Ok((previous, outcome))
    }

    /// Unfreeze `key`, returning its snapshot (a missing one is fine) and the
    /// overlay change.
    pub fn thaw(&mut self, key: CellKey) -> Result<(Option<CellResult>, AppendOutcome)> {
        self.check(key)?;
        let outcome = self.append_attributes(frozen_entry(key, false))?;
        let snapshot = self.evaluator.take_frozen(&key);
        self.evaluator.clear_results();
        Ok((snapshot, outcome))
    }

    /// Put a frozen snapshot back, or drop the current one with `None`.
    pub(crate) fn restore_frozen(&mut self, key: CellKey, snapshot: Option<CellResult>) {
        match snapshot {
            Some(result) => {
                self.evaluator.store_frozen(key, result);
            }
            None => {
                self.evaluator.take_frozen(&key);
            }
        }
        self.evaluator.clear_results();
    }
}

fn frozen_entry(key: CellKey, frozen: bool) -> OverlayEntry {
    OverlayEntry::new(
        Selection::single(key.row as i64, key.column as i64),
        key.table,
        AttributeDiff::frozen(frozen),
    )
}
