//! The sheet: a grid plus the evaluator that computes its values.
//!
//! Everything a caller does to a spreadsheet goes through [`Sheet`], which
//! keeps the evaluator's caches consistent with the grid.

mod ops;
mod snapshot;

pub use snapshot::GridSnapshot;

use std::sync::RwLockReadGuard;

use crate::error::{Result, TabulaError};
use crate::eval::{Evaluator, FindOptions, MacroOutput};
use crate::grid::Grid;
use crate::settings::Settings;
use tabula_engine::engine::{CellResult, format_result};
use tabula_engine::{AppendOutcome, AttributeOverlay, CellAttributes, CellKey, OverlayEntry, Shape};

pub struct Sheet {
    grid: Grid,
    evaluator: Evaluator,
    settings: Settings,
}

impl Sheet {
    /// Empty sheet with the default shape from `settings`.
    pub fn new(settings: Settings) -> Result<Self> {
        let shape = settings.default_shape;
        Self::with_shape(shape, settings)
    }

    pub fn with_shape(shape: Shape, settings: Settings) -> Result<Self> {
        let grid = Grid::new(shape, settings.max_shape)?;
        let evaluator = Evaluator::new(
            grid.cells().clone(),
            grid.shared_attributes().clone(),
            grid.shape(),
            &settings,
        );
        Ok(Sheet {
            grid,
            evaluator,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    fn check(&self, key: CellKey) -> Result<()> {
        if self.grid.contains(&key) {
            Ok(())
        } else {
            Err(TabulaError::CellOutOfBounds(key))
        }
    }

    // ---- cells ----

    pub fn get_code(&self, key: CellKey) -> Option<String> {
        self.grid.code(&key)
    }

    /// Set (or with `None` or `""`, clear) the code of `key`.
    ///
    /// Returns the code the cell held before. Writes into a cell covered by
    /// another cell's merge area are ignored.
    pub fn set_code(&mut self, key: CellKey, code: Option<&str>) -> Result<Option<String>> {
        self.check(key)?;
        let old = self.grid.code(&key);
        self.evaluator.write_code(key, code);
        Ok(old)
    }

    pub fn pop(&mut self, key: CellKey) -> Option<String> {
        self.evaluator.pop(&key)
    }

    /// Value of `key`; `None` for empty cells, button cells and keys outside
    /// the grid.
    pub fn get_value(&self, key: CellKey) -> Option<CellResult> {
        self.evaluator.value(key)
    }

    /// Value of `key` as display text. Empty cells are empty.
    pub fn display_value(&self, key: CellKey) -> String {
        self.get_value(key)
            .map(|result| format_result(&result))
            .unwrap_or_default()
    }

    /// Keys holding code, sorted; limited to `table` when given.
    pub fn keys(&self, table: Option<usize>) -> Vec<CellKey> {
        self.grid.keys(table)
    }

    pub fn last_filled_cell(&self, table: Option<usize>) -> (usize, usize) {
        self.grid.last_filled_cell(table)
    }

    // ---- attributes ----

    pub fn attributes(&self) -> RwLockReadGuard<'_, AttributeOverlay> {
        self.grid.attributes()
    }

    pub fn effective_attributes(&self, key: CellKey) -> CellAttributes {
        self.grid.attributes().lookup(&key)
    }

    pub fn append_attributes(&mut self, entry: OverlayEntry) -> Result<AppendOutcome> {
        if entry.table >= self.grid.shape().tables {
            return Err(TabulaError::CellOutOfBounds(CellKey::new(0, 0, entry.table)));
        }
        Ok(self.grid.attributes_mut().append(entry)?)
    }

    /// Undo the [`append_attributes`](Self::append_attributes) that
    /// returned `outcome`.
    pub fn revert_attributes(&mut self, outcome: &AppendOutcome) {
        self.grid.attributes_mut().revert_append(outcome);
    }

    pub fn pop_last_attributes(&mut self) -> Option<OverlayEntry> {
        self.grid.attributes_mut().pop()
    }

    /// Top-left cell of the merge area covering `key`.
    pub fn merging_cell(&self, key: CellKey) -> Option<CellKey> {
        self.grid.attributes().get_merging_cell(&key)
    }

    // ---- sizes ----

    pub fn row_height(&self, row: usize, table: usize) -> Option<f64> {
        self.grid.row_height(row, table)
    }

    /// Set or (with `None`) remove a row height override; returns the old one.
    pub fn set_row_height(&mut self, row: usize, table: usize, height: Option<f64>) -> Option<f64> {
        self.grid.set_row_height(row, table, height)
    }

    pub fn col_width(&self, column: usize, table: usize) -> Option<f64> {
        self.grid.col_width(column, table)
    }

    pub fn set_col_width(&mut self, column: usize, table: usize, width: Option<f64>) -> Option<f64> {
        self.grid.set_col_width(column, table, width)
    }

    // ---- macros and evaluation modes ----

    pub fn macros(&self) -> &str {
        self.grid.macros()
    }

    /// Replace the macro text without running it; returns the old text.
    pub fn set_macros(&mut self, macros: impl Into<String>) -> String {
        self.grid.set_macros(macros)
    }

    pub fn execute_macros(&mut self) -> MacroOutput {
        self.evaluator.execute_macros(self.grid.macros())
    }

    pub fn safe_mode(&self) -> bool {
        self.evaluator.safe_mode()
    }

    /// Switch safe mode. A change drops cached results and runs the macros
    /// again, whose output is returned.
    pub fn set_safe_mode(&mut self, safe_mode: bool) -> Option<MacroOutput> {
        if self.evaluator.set_safe_mode(safe_mode) == safe_mode {
            return None;
        }
        tracing::info!(safe_mode, "safe mode changed");
        Some(self.execute_macros())
    }

    pub fn find_next(&self, start: CellKey, text: &str, options: &FindOptions) -> Option<CellKey> {
        self.evaluator.find_next(start, text, options)
    }

    /// Empty the sheet, keeping its shape.
    pub fn reset(&mut self) {
        self.grid.reset();
        self.evaluator.reset();
    }
}
