//! The undoable commands.

use std::any::Any;
use std::collections::BTreeMap;

use super::Command;
use crate::error::{Result, TabulaError};
use crate::grid::{Discarded, SizeMap};
use crate::sheet::Sheet;
use tabula_engine::attributes::{AttributeDiff, MergeArea};
use tabula_engine::engine::CellResult;
use tabula_engine::{AppendOutcome, Axis, CellKey, OverlayEntry, Selection, Shape};

/// Set the code of one or more cells.
#[derive(Debug, Clone)]
pub struct SetCodeCommand {
    description: String,
    /// (key, code before, code after), in application order.
    changes: Vec<(CellKey, Option<String>, Option<String>)>,
}

impl SetCodeCommand {
    pub fn new(description: impl Into<String>, cells: Vec<(CellKey, Option<String>)>) -> Self {
        SetCodeCommand {
            description: description.into(),
            changes: cells
                .into_iter()
                .map(|(key, code)| (key, None, code))
                .collect(),
        }
    }

    /// Edits of the same cell share a description, so successive ones merge.
    pub fn single(key: CellKey, code: Option<&str>) -> Self {
        Self::new(
            format!("Set code for cell {}", key),
            vec![(key, code.map(str::to_string))],
        )
    }

    /// Record changes that were already made, e.g. by a macro.
    pub fn from_changes(
        description: impl Into<String>,
        changes: BTreeMap<CellKey, (Option<String>, Option<String>)>,
    ) -> Self {
        SetCodeCommand {
            description: description.into(),
            changes: changes
                .into_iter()
                .map(|(key, (old, new))| (key, old, new))
                .collect(),
        }
    }
}

impl Command for SetCodeCommand {
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()> {
        let shape = sheet.shape();
        if let Some((key, _, _)) = self.changes.iter().find(|(key, _, _)| !shape.contains(key)) {
            return Err(TabulaError::CellOutOfBounds(*key));
        }
        for (key, old, new) in &mut self.changes {
            *old = sheet.set_code(*key, new.as_deref())?;
        }
        Ok(())
    }

    fn revert(&mut self, sheet: &mut Sheet) -> Result<()> {
        for (key, old, _) in self.changes.iter().rev() {
            sheet.set_code(*key, old.as_deref())?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }

    /// Successive edits with the same description undo as one step.
    fn merge(&mut self, other: &dyn Command) -> bool {
        match other.as_any().downcast_ref::<SetCodeCommand>() {
            Some(other) if other.description == self.description => {
                self.changes.extend(other.changes.iter().cloned());
                true
            }
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Append one overlay entry.
#[derive(Debug, Clone)]
pub struct SetAttributeCommand {
    description: String,
    entry: OverlayEntry,
    outcome: Option<AppendOutcome>,
}

impl SetAttributeCommand {
    pub fn new(selection: Selection, table: usize, diff: AttributeDiff) -> Self {
        Self::described("Set attributes", OverlayEntry::new(selection, table, diff))
    }

    fn described(description: &str, entry: OverlayEntry) -> Self {
        SetAttributeCommand {
            description: description.to_string(),
            entry,
            outcome: None,
        }
    }

    /// Make `key` a button labelled `label`, or with `None` a normal cell.
    pub fn button(key: CellKey, label: Option<String>) -> Self {
        Self::described(
            "Set button cell",
            OverlayEntry::new(
                Selection::single(key.row as i64, key.column as i64),
                key.table,
                AttributeDiff::button_cell(label),
            ),
        )
    }

    /// Merge the cells of `area` into its top-left cell.
    pub fn merge_cells(area: MergeArea, table: usize) -> Self {
        Self::described(
            "Merge cells",
            OverlayEntry::new(area_selection(&area), table, AttributeDiff::merge_area(Some(area))),
        )
    }

    /// Undo a [`merge_cells`](Self::merge_cells) of `area`.
    pub fn unmerge_cells(area: MergeArea, table: usize) -> Self {
        Self::described(
            "Unmerge cells",
            OverlayEntry::new(area_selection(&area), table, AttributeDiff::merge_area(None)),
        )
    }
}

fn area_selection(area: &MergeArea) -> Selection {
    Selection::block(
        area.top as i64,
        area.left as i64,
        area.bottom as i64,
        area.right as i64,
    )
}

impl Command for SetAttributeCommand {
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()> {
        self.outcome = Some(sheet.append_attributes(self.entry.clone())?);
        Ok(())
    }

    fn revert(&mut self, sheet: &mut Sheet) -> Result<()> {
        if let Some(outcome) = self.outcome.take() {
            sheet.revert_attributes(&outcome);
        }
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Set the height of rows or the width of columns.
#[derive(Debug, Clone)]
pub struct ResizeCommand {
    axis: Axis,
    indices: Vec<usize>,
    table: usize,
    old: Vec<Option<f64>>,
    size: Option<f64>,
}

impl ResizeCommand {
    /// `None` removes the override.
    pub fn rows(rows: Vec<usize>, table: usize, height: Option<f64>) -> Self {
        Self::sized(Axis::Row, rows, table, height)
    }

    pub fn columns(columns: Vec<usize>, table: usize, width: Option<f64>) -> Self {
        Self::sized(Axis::Column, columns, table, width)
    }

    fn sized(axis: Axis, indices: Vec<usize>, table: usize, size: Option<f64>) -> Self {
        ResizeCommand {
            axis,
            indices,
            table,
            old: Vec::new(),
            size,
        }
    }

    fn set(&self, sheet: &mut Sheet, index: usize, size: Option<f64>) -> Option<f64> {
        match self.axis {
            Axis::Row => sheet.set_row_height(index, self.table, size),
            _ => sheet.set_col_width(index, self.table, size),
        }
    }
}

impl Command for ResizeCommand {
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()> {
        let old: Vec<Option<f64>> = self
            .indices
            .iter()
            .map(|&index| self.set(sheet, index, self.size))
            .collect();
        self.old = old;
        Ok(())
    }

    fn revert(&mut self, sheet: &mut Sheet) -> Result<()> {
        for (&index, &old) in self.indices.iter().zip(&self.old) {
            self.set(sheet, index, old);
        }
        Ok(())
    }

    fn description(&self) -> &str {
        match self.axis {
            Axis::Row => "Resize rows",
            _ => "Resize columns",
        }
    }

    /// Keeps the sizes from before the first resize and the latest new size.
    fn merge(&mut self, other: &dyn Command) -> bool {
        match other.as_any().downcast_ref::<ResizeCommand>() {
            Some(other)
                if other.axis == self.axis
                    && other.indices == self.indices
                    && other.table == self.table =>
            {
                self.size = other.size;
                true
            }
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Formats and sizes as they were before a structural edit.
#[derive(Debug, Clone, Default)]
struct Saved {
    removed: BTreeMap<CellKey, String>,
    row_heights: SizeMap,
    col_widths: SizeMap,
    overlay: Vec<OverlayEntry>,
}

impl Saved {
    fn capture(sheet: &Sheet) -> Self {
        Saved {
            removed: BTreeMap::new(),
            row_heights: sheet.grid().row_heights().clone(),
            col_widths: sheet.grid().col_widths().clone(),
            overlay: sheet.attributes().entries().to_vec(),
        }
    }

    fn restore(self, sheet: &mut Sheet) {
        sheet.restore_cells(&self.removed);
        sheet.replace_sizes(self.row_heights, self.col_widths);
        sheet.replace_overlay(self.overlay);
    }
}

/// Negative points count from the end; resolve them against the current
/// length so that the inverse edit addresses the same place.
fn resolve_point(sheet: &Sheet, point: i64, axis: Axis) -> i64 {
    let len = sheet.shape().len(axis) as i64;
    if point < 0 && point >= -len { point + len } else { point }
}

fn axis_name(axis: Axis, insert: bool) -> &'static str {
    match (axis, insert) {
        (Axis::Row, true) => "Insert rows",
        (Axis::Column, true) => "Insert columns",
        (Axis::Table, true) => "Insert tables",
        (Axis::Row, false) => "Delete rows",
        (Axis::Column, false) => "Delete columns",
        (Axis::Table, false) => "Delete tables",
    }
}

/// Insert rows, columns or tables.
#[derive(Debug, Clone)]
pub struct InsertCommand {
    point: i64,
    count: usize,
    axis: Axis,
    table: Option<usize>,
    saved: Option<Saved>,
}

impl InsertCommand {
    /// `table` limits row and column inserts to one table.
    pub fn new(point: i64, count: usize, axis: Axis, table: Option<usize>) -> Self {
        InsertCommand {
            point,
            count,
            axis,
            table,
            saved: None,
        }
    }

    pub fn rows(point: i64, count: usize, table: Option<usize>) -> Self {
        Self::new(point, count, Axis::Row, table)
    }

    pub fn columns(point: i64, count: usize, table: Option<usize>) -> Self {
        Self::new(point, count, Axis::Column, table)
    }

    pub fn tables(point: i64, count: usize) -> Self {
        Self::new(point, count, Axis::Table, None)
    }
}

impl Command for InsertCommand {
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()> {
        self.point = resolve_point(sheet, self.point, self.axis);
        let mut saved = Saved::capture(sheet);
        saved.removed = sheet.insert(self.point, self.count, self.axis, self.table)?;
        self.saved = Some(saved);
        Ok(())
    }

    fn revert(&mut self, sheet: &mut Sheet) -> Result<()> {
        sheet.delete(self.point, self.count, self.axis, self.table)?;
        if let Some(saved) = self.saved.take() {
            saved.restore(sheet);
        }
        Ok(())
    }

    fn description(&self) -> &str {
        axis_name(self.axis, true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Delete rows, columns or tables.
#[derive(Debug, Clone)]
pub struct DeleteCommand {
    point: i64,
    count: usize,
    axis: Axis,
    table: Option<usize>,
    saved: Option<Saved>,
}

impl DeleteCommand {
    pub fn new(point: i64, count: usize, axis: Axis, table: Option<usize>) -> Self {
        DeleteCommand {
            point,
            count,
            axis,
            table,
            saved: None,
        }
    }

    pub fn rows(point: i64, count: usize, table: Option<usize>) -> Self {
        Self::new(point, count, Axis::Row, table)
    }

    pub fn columns(point: i64, count: usize, table: Option<usize>) -> Self {
        Self::new(point, count, Axis::Column, table)
    }

    pub fn tables(point: i64, count: usize) -> Self {
        Self::new(point, count, Axis::Table, None)
    }
}

impl Command for DeleteCommand {
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()> {
        self.point = resolve_point(sheet, self.point, self.axis);
        let mut saved = Saved::capture(sheet);
        saved.removed = sheet.delete(self.point, self.count, self.axis, self.table)?;
        self.saved = Some(saved);
        Ok(())
    }

    fn revert(&mut self, sheet: &mut Sheet) -> Result<()> {
        sheet.insert(self.point, self.count, self.axis, self.table)?;
        if let Some(saved) = self.saved.take() {
            saved.restore(sheet);
        }
        Ok(())
    }

    fn description(&self) -> &str {
        axis_name(self.axis, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Freeze a cell at its current value.
#[derive(Debug, Clone)]
pub struct FreezeCommand {
    key: CellKey,
    applied: Option<(Option<CellResult>, AppendOutcome)>,
}

impl FreezeCommand {
    pub fn new(key: CellKey) -> Self {
        FreezeCommand { key, applied: None }
    }
}

impl Command for FreezeCommand {
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()> {
        self.applied = Some(sheet.freeze(self.key)?);
        Ok(())
    }

    fn revert(&mut self, sheet: &mut Sheet) -> Result<()> {
        if let Some((previous, outcome)) = self.applied.take() {
            sheet.revert_attributes(&outcome);
            sheet.restore_frozen(self.key, previous);
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Freeze cell"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Let a frozen cell follow its code again.
#[derive(Debug, Clone)]
pub struct ThawCommand {
    key: CellKey,
    applied: Option<(Option<CellResult>, AppendOutcome)>,
}

impl ThawCommand {
    pub fn new(key: CellKey) -> Self {
        ThawCommand { key, applied: None }
    }
}

impl Command for ThawCommand {
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()> {
        self.applied = Some(sheet.thaw(self.key)?);
        Ok(())
    }

    fn revert(&mut self, sheet: &mut Sheet) -> Result<()> {
        if let Some((snapshot, outcome)) = self.applied.take() {
            sheet.revert_attributes(&outcome);
            if snapshot.is_some() {
                sheet.restore_frozen(self.key, snapshot);
            }
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Thaw cell"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Change the shape of the grid.
#[derive(Debug, Clone)]
pub struct ResizeGridCommand {
    shape: Shape,
    previous: Option<(Shape, Discarded)>,
}

impl ResizeGridCommand {
    pub fn new(shape: Shape) -> Self {
        ResizeGridCommand {
            shape,
            previous: None,
        }
    }
}

impl Command for ResizeGridCommand {
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()> {
        let old = sheet.shape();
        let discarded = sheet.set_shape(self.shape)?;
        self.previous = Some((old, discarded));
        Ok(())
    }

    fn revert(&mut self, sheet: &mut Sheet) -> Result<()> {
        if let Some((shape, discarded)) = self.previous.take() {
            sheet.restore_shape(shape, &discarded)?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Resize grid"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
