//! Insertion and deletion of rows, columns and tables.
//!
//! Cells, size overrides and overlay entries all follow the cells they
//! belong to: on insert everything at or after the insertion point moves
//! away from it, on delete everything inside the deleted range goes and
//! everything after it moves back. Row and column edits keep the shape;
//! [`Grid::insert_tables`] and [`Grid::delete_tables`] grow and shrink it.

use std::collections::BTreeMap;

use super::{Grid, SizeMap, clamp_merge_area};
use crate::error::{Result, StructuralBoundsError};
use tabula_engine::{Axis, CellKey, OverlayEntry, Shape};

/// Which way a structural edit goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edit {
    Insert,
    Delete,
}

impl Edit {
    fn name(&self) -> &'static str {
        match self {
            Edit::Insert => "insert",
            Edit::Delete => "delete",
        }
    }
}

/// Resolved edit: start position (non-negative), count and direction.
#[derive(Clone, Copy, Debug)]
struct Span {
    point: usize,
    count: usize,
    edit: Edit,
}

impl Span {
    /// New position of `pos`, or `None` when the edit removes it.
    /// `len` is the axis length; positions pushed past it are removed.
    fn remap(&self, pos: usize, len: usize) -> Option<usize> {
        if pos < self.point {
            return Some(pos);
        }
        match self.edit {
            Edit::Insert => {
                let moved = pos + self.count;
                (moved < len).then_some(moved)
            }
            Edit::Delete => {
                if pos < self.point + self.count {
                    None
                } else {
                    Some(pos - self.count)
                }
            }
        }
    }

    /// Pivot and signed delta for `Selection::insert`, which moves
    /// coordinates strictly greater than the pivot.
    fn selection_shift(&self) -> (i64, i64) {
        let point = self.point as i64;
        let count = self.count as i64;
        match self.edit {
            Edit::Insert => (point - 1, count),
            Edit::Delete => (point + count - 1, -count),
        }
    }
}

impl Grid {
    /// Insert `count` rows, columns or tables before `point`.
    ///
    /// Negative points count from the end. For rows and columns, `table`
    /// limits the edit to one table. Returns the code of cells pushed past
    /// the edge of the grid.
    pub fn insert(
        &mut self,
        point: i64,
        count: usize,
        axis: Axis,
        table: Option<usize>,
    ) -> Result<BTreeMap<CellKey, String>> {
        let span = self.validate(Edit::Insert, point, count, axis, table)?;
        Ok(self.apply_edit(span, axis, table))
    }

    /// Delete `count` rows, columns or tables starting at `point`.
    ///
    /// Returns the code of the deleted cells.
    pub fn delete(
        &mut self,
        point: i64,
        count: usize,
        axis: Axis,
        table: Option<usize>,
    ) -> Result<BTreeMap<CellKey, String>> {
        let span = self.validate(Edit::Delete, point, count, axis, table)?;
        Ok(self.apply_edit(span, axis, table))
    }

    /// Insert `count` tables before `point`, growing the shape to make room.
    pub fn insert_tables(&mut self, point: i64, count: usize) -> Result<()> {
        let span = self.validate(Edit::Insert, point, count, Axis::Table, None)?;
        let shape = self
            .shape
            .with_len(Axis::Table, self.shape.tables + count)
            .checked(&self.max_shape)?;
        self.shape = shape;
        self.apply_edit(span, Axis::Table, None);
        Ok(())
    }

    /// Delete `count` tables starting at `point` and shrink the shape.
    ///
    /// Returns the code of the deleted cells.
    pub fn delete_tables(&mut self, point: i64, count: usize) -> Result<BTreeMap<CellKey, String>> {
        let span = self.validate(Edit::Delete, point, count, Axis::Table, None)?;
        let removed = self.apply_edit(span, Axis::Table, None);
        self.shape = self.shape.with_len(Axis::Table, self.shape.tables - count);
        Ok(removed)
    }

    fn validate(
        &self,
        edit: Edit,
        point: i64,
        count: usize,
        axis: Axis,
        table: Option<usize>,
    ) -> std::result::Result<Span, StructuralBoundsError> {
        let len = self.shape.len(axis);
        let signed_len = len as i64;

        let in_range = match edit {
            Edit::Insert => -signed_len <= point && point <= signed_len,
            Edit::Delete => -signed_len < point && point < signed_len,
        };
        if !in_range {
            return Err(StructuralBoundsError::PointOutOfRange {
                operation: edit.name(),
                axis,
                point,
                len,
            });
        }
        if edit == Edit::Delete && count >= len {
            return Err(StructuralBoundsError::DeleteAll { axis });
        }
        if let Some(table) = table.filter(|&t| axis != Axis::Table && t >= self.shape.tables) {
            return Err(StructuralBoundsError::NoSuchTable { table });
        }

        let point = (if point < 0 { point + signed_len } else { point }) as usize;
        if edit == Edit::Delete && point + count > len {
            return Err(StructuralBoundsError::PastEnd {
                axis,
                point,
                count,
                len,
            });
        }
        Ok(Span {
            point,
            count,
            edit,
        })
    }

    fn apply_edit(&mut self, span: Span, axis: Axis, table: Option<usize>) -> BTreeMap<CellKey, String> {
        let table = if axis == Axis::Table { None } else { table };
        let removed = self.remap_cells(span, axis, table);
        self.remap_sizes(span, axis, table);
        self.remap_overlay(span, axis, table);

        tracing::debug!(
            edit = span.edit.name(),
            %axis,
            point = span.point,
            count = span.count,
            ?table,
            removed = removed.len(),
            "structural edit"
        );
        removed
    }

    fn remap_cells(&mut self, span: Span, axis: Axis, table: Option<usize>) -> BTreeMap<CellKey, String> {
        let len = self.shape.len(axis);

        // Collect all affected cells first, then remove, then reinsert, so
        // moved cells never overwrite each other.
        let moving: Vec<(CellKey, String)> = self
            .cells
            .iter()
            .filter(|entry| entry.key().coord(axis) >= span.point)
            .filter(|entry| table.is_none_or(|t| entry.key().table == t))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (key, _) in &moving {
            self.cells.remove(key);
        }

        let mut removed = BTreeMap::new();
        for (key, code) in moving {
            match span.remap(key.coord(axis), len) {
                Some(pos) => {
                    self.cells.insert(key.with_coord(axis, pos), code);
                }
                None => {
                    removed.insert(key, code);
                }
            }
        }
        removed
    }

    fn remap_sizes(&mut self, span: Span, axis: Axis, table: Option<usize>) {
        let shape = self.shape;
        let remap = |sizes: SizeMap, axis_len: usize, by_table: bool| -> SizeMap {
            sizes
                .into_iter()
                .filter_map(|((pos, tab), size)| {
                    if by_table {
                        let tab = span.remap(tab, shape.tables)?;
                        Some(((pos, tab), size))
                    } else if table.is_none_or(|t| t == tab) {
                        let pos = span.remap(pos, axis_len)?;
                        Some(((pos, tab), size))
                    } else {
                        Some(((pos, tab), size))
                    }
                })
                .collect()
        };

        match axis {
            Axis::Row => {
                self.row_heights = remap(std::mem::take(&mut self.row_heights), shape.rows, false);
            }
            Axis::Column => {
                self.col_widths = remap(std::mem::take(&mut self.col_widths), shape.columns, false);
            }
            Axis::Table => {
                self.row_heights = remap(std::mem::take(&mut self.row_heights), shape.rows, true);
                self.col_widths = remap(std::mem::take(&mut self.col_widths), shape.columns, true);
            }
        }
    }

    fn remap_overlay(&mut self, span: Span, axis: Axis, table: Option<usize>) {
        let shape = self.shape;
        let mut overlay = self.attributes_mut();
        match axis {
            Axis::Table => overlay.retain_map(|entry| match span.remap(entry.table, shape.tables) {
                Some(tab) => {
                    entry.table = tab;
                    true
                }
                None => false,
            }),
            Axis::Row | Axis::Column => overlay.retain_map(|entry| {
                if table.is_none_or(|t| t == entry.table) {
                    shift_entry(entry, span, axis, &shape);
                }
                !entry.diff.is_empty()
            }),
        }
    }
}

/// Shift an entry's selection and merge area along a planar axis.
fn shift_entry(entry: &mut OverlayEntry, span: Span, axis: Axis, shape: &Shape) {
    let (pivot, delta) = span.selection_shift();
    entry.selection.insert(pivot, delta, axis);

    if let Some(Some(area)) = entry.diff.merge_area {
        let shift = |value: usize| {
            let value = value as i64;
            if value > pivot { value + delta } else { value }
        };
        let rect = match axis {
            Axis::Row => (
                shift(area.top),
                area.left as i64,
                shift(area.bottom),
                area.right as i64,
            ),
            _ => (
                area.top as i64,
                shift(area.left),
                area.bottom as i64,
                shift(area.right),
            ),
        };
        entry.diff.merge_area = clamp_merge_area(rect, shape).map(Some);
    }
}
