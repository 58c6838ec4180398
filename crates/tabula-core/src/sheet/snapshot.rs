//! Whole-sheet snapshots for saving and loading.

use serde::{Deserialize, Serialize};

use super::Sheet;
use crate::error::{Result, StructuralBoundsError, TabulaError};
use crate::settings::Settings;
use tabula_engine::{Axis, CellKey, OverlayEntry, Shape};

/// Everything needed to rebuild a sheet: cells, formats, sizes and macros.
///
/// Cached results and frozen snapshots are not part of it; frozen cells
/// are evaluated again the first time they are read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub shape: Shape,
    /// Cell code, sorted by key.
    pub cells: Vec<(CellKey, String)>,
    /// Overlay entries in application order.
    pub attributes: Vec<OverlayEntry>,
    pub row_heights: Vec<((usize, usize), f64)>,
    pub col_widths: Vec<((usize, usize), f64)>,
    pub macros: String,
}

impl Sheet {
    pub fn snapshot(&self) -> GridSnapshot {
        let cells = self
            .grid
            .keys(None)
            .into_iter()
            .filter_map(|key| self.grid.code(&key).map(|code| (key, code)))
            .collect();
        GridSnapshot {
            shape: self.grid.shape(),
            cells,
            attributes: self.grid.attributes().entries().to_vec(),
            row_heights: self.grid.row_heights().iter().map(|(k, v)| (*k, *v)).collect(),
            col_widths: self.grid.col_widths().iter().map(|(k, v)| (*k, *v)).collect(),
            macros: self.grid.macros().to_string(),
        }
    }

    pub fn from_snapshot(snapshot: GridSnapshot, settings: Settings) -> Result<Self> {
        let mut sheet = Sheet::with_shape(snapshot.shape, settings)?;
        sheet.load_snapshot(snapshot)?;
        Ok(sheet)
    }

    /// Replace the contents of this sheet. Macros are stored but not run.
    ///
    /// The snapshot is checked first; on error the sheet is unchanged.
    pub fn load_snapshot(&mut self, snapshot: GridSnapshot) -> Result<()> {
        let shape = snapshot.shape.checked(&self.grid.max_shape())?;
        if let Some((key, _)) = snapshot.cells.iter().find(|(key, _)| !shape.contains(key)) {
            return Err(TabulaError::CellOutOfBounds(*key));
        }
        for entry in &snapshot.attributes {
            if entry.table >= shape.tables {
                return Err(StructuralBoundsError::NoSuchTable { table: entry.table }.into());
            }
            entry.diff.validate()?;
        }
        check_sizes(&snapshot.row_heights, Axis::Row, shape.rows, shape.tables)?;
        check_sizes(&snapshot.col_widths, Axis::Column, shape.columns, shape.tables)?;

        self.reset();
        self.grid.set_shape(shape)?;
        for (key, code) in &snapshot.cells {
            self.grid.store(*key, Some(code.as_str()));
        }
        self.grid.attributes_mut().restore(snapshot.attributes);
        self.grid.replace_row_heights(snapshot.row_heights.into_iter().collect());
        self.grid.replace_col_widths(snapshot.col_widths.into_iter().collect());
        self.grid.set_macros(snapshot.macros);
        self.evaluator.set_shape(shape);

        tracing::info!(%shape, cells = snapshot.cells.len(), "snapshot loaded");
        Ok(())
    }
}

fn check_sizes(sizes: &[((usize, usize), f64)], axis: Axis, len: usize, tables: usize) -> Result<()> {
    match sizes.iter().find(|((index, table), _)| *index >= len || *table >= tables) {
        Some(&((index, table), _)) => Err(TabulaError::SizeOutOfBounds { axis, index, table }),
        None => Ok(()),
    }
}
