//! Grid container: cell code, attribute overlay, size overrides, macros
//! and shape.

mod structure;

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use tabula_engine::attributes::MergeArea;
use tabula_engine::engine::CodeStore;
use tabula_engine::{AttributeOverlay, CellKey, OverlayEntry, Shape, SharedOverlay};

/// Size overrides keyed by (row or column, table).
pub type SizeMap = BTreeMap<(usize, usize), f64>;

/// State removed by a shape change, enough to put it back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Discarded {
    pub cells: BTreeMap<CellKey, String>,
    pub row_heights: SizeMap,
    pub col_widths: SizeMap,
    /// The overlay before the change, when clipping altered it.
    pub overlay: Option<Vec<OverlayEntry>>,
}

impl Discarded {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
            && self.row_heights.is_empty()
            && self.col_widths.is_empty()
            && self.overlay.is_none()
    }
}

#[derive(Debug)]
pub struct Grid {
    cells: CodeStore,
    attributes: SharedOverlay,
    row_heights: SizeMap,
    col_widths: SizeMap,
    macros: String,
    shape: Shape,
    max_shape: Shape,
}

impl Grid {
    pub fn new(shape: Shape, max_shape: Shape) -> Result<Self> {
        let shape = shape.checked(&max_shape)?;
        Ok(Grid {
            cells: Arc::new(DashMap::new()),
            attributes: Arc::new(RwLock::new(AttributeOverlay::new())),
            row_heights: SizeMap::new(),
            col_widths: SizeMap::new(),
            macros: String::new(),
            shape,
            max_shape,
        })
    }

    /// Shared handle to the cell store (DashMap is Arc-based, clones are cheap).
    pub fn cells(&self) -> &CodeStore {
        &self.cells
    }

    pub fn shared_attributes(&self) -> &SharedOverlay {
        &self.attributes
    }

    pub fn attributes(&self) -> RwLockReadGuard<'_, AttributeOverlay> {
        self.attributes.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attributes_mut(&self) -> RwLockWriteGuard<'_, AttributeOverlay> {
        self.attributes.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn max_shape(&self) -> Shape {
        self.max_shape
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.shape.contains(key)
    }

    pub fn code(&self, key: &CellKey) -> Option<String> {
        self.cells.get(key).map(|code| code.clone())
    }

    /// Store `code` at `key` without touching any cache; empty or `None`
    /// code empties the cell. Returns the previous code.
    pub fn store(&self, key: CellKey, code: Option<&str>) -> Option<String> {
        match code {
            Some(code) if !code.is_empty() => self.cells.insert(key, code.to_string()),
            _ => self.pop(&key),
        }
    }

    pub fn pop(&self, key: &CellKey) -> Option<String> {
        self.cells.remove(key).map(|(_, code)| code)
    }

    /// Keys holding code, sorted; limited to `table` when given.
    pub fn keys(&self, table: Option<usize>) -> Vec<CellKey> {
        let mut keys: Vec<CellKey> = self
            .cells
            .iter()
            .map(|entry| *entry.key())
            .filter(|key| table.is_none_or(|t| key.table == t))
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Bottom-most row and right-most column holding code.
    pub fn last_filled_cell(&self, table: Option<usize>) -> (usize, usize) {
        self.cells
            .iter()
            .map(|entry| *entry.key())
            .filter(|key| table.is_none_or(|t| key.table == t))
            .fold((0, 0), |(row, column), key| {
                (row.max(key.row), column.max(key.column))
            })
    }

    pub fn row_height(&self, row: usize, table: usize) -> Option<f64> {
        self.row_heights.get(&(row, table)).copied()
    }

    /// Set or (with `None`) remove a row height override, returning the old one.
    pub fn set_row_height(&mut self, row: usize, table: usize, height: Option<f64>) -> Option<f64> {
        match height {
            Some(height) => self.row_heights.insert((row, table), height),
            None => self.row_heights.remove(&(row, table)),
        }
    }

    pub fn col_width(&self, column: usize, table: usize) -> Option<f64> {
        self.col_widths.get(&(column, table)).copied()
    }

    pub fn set_col_width(&mut self, column: usize, table: usize, width: Option<f64>) -> Option<f64> {
        match width {
            Some(width) => self.col_widths.insert((column, table), width),
            None => self.col_widths.remove(&(column, table)),
        }
    }

    pub fn row_heights(&self) -> &SizeMap {
        &self.row_heights
    }

    pub fn col_widths(&self) -> &SizeMap {
        &self.col_widths
    }

    pub fn replace_row_heights(&mut self, heights: SizeMap) -> SizeMap {
        std::mem::replace(&mut self.row_heights, heights)
    }

    pub fn replace_col_widths(&mut self, widths: SizeMap) -> SizeMap {
        std::mem::replace(&mut self.col_widths, widths)
    }

    pub fn macros(&self) -> &str {
        &self.macros
    }

    pub fn set_macros(&mut self, macros: impl Into<String>) -> String {
        std::mem::replace(&mut self.macros, macros.into())
    }

    /// Clear cells, overlay, size overrides and macros. The shape is kept.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.attributes_mut().clear();
        self.row_heights.clear();
        self.col_widths.clear();
        self.macros.clear();
    }

    /// Change the shape, discarding everything that falls outside it.
    pub fn set_shape(&mut self, shape: Shape) -> Result<Discarded> {
        let shape = shape.checked(&self.max_shape)?;
        let mut discarded = Discarded::default();

        for key in self.keys(None) {
            if shape.contains(&key) {
                continue;
            }
            if let Some(code) = self.pop(&key) {
                discarded.cells.insert(key, code);
            }
        }

        let (kept, dropped): (SizeMap, SizeMap) = std::mem::take(&mut self.row_heights)
            .into_iter()
            .partition(|&((row, table), _)| row < shape.rows && table < shape.tables);
        self.row_heights = kept;
        discarded.row_heights = dropped;

        let (kept, dropped): (SizeMap, SizeMap) = std::mem::take(&mut self.col_widths)
            .into_iter()
            .partition(|&((column, table), _)| column < shape.columns && table < shape.tables);
        self.col_widths = kept;
        discarded.col_widths = dropped;

        {
            let mut overlay = self.attributes_mut();
            let before = overlay.entries().to_vec();
            overlay.retain_map(|entry| clip_entry(entry, &shape));
            if overlay.entries() != &before[..] {
                discarded.overlay = Some(before);
            }
        }

        tracing::info!(old = %self.shape, new = %shape, cells = discarded.cells.len(), "grid reshaped");
        self.shape = shape;
        Ok(discarded)
    }

    /// Undo a [`set_shape`](Self::set_shape): restore `shape` and the
    /// discarded state.
    pub(crate) fn restore_shape(&mut self, shape: Shape, discarded: &Discarded) -> Result<()> {
        self.shape = shape.checked(&self.max_shape)?;
        for (key, code) in &discarded.cells {
            self.cells.insert(*key, code.clone());
        }
        self.row_heights
            .extend(discarded.row_heights.iter().map(|(k, v)| (*k, *v)));
        self.col_widths
            .extend(discarded.col_widths.iter().map(|(k, v)| (*k, *v)));
        if let Some(entries) = &discarded.overlay {
            self.attributes_mut().restore(entries.clone());
        }
        Ok(())
    }
}

/// Clamp a merge rectangle (possibly shifted off-grid) into `shape`.
/// `None` when it lies entirely outside.
pub(crate) fn clamp_merge_area(
    (top, left, bottom, right): (i64, i64, i64, i64),
    shape: &Shape,
) -> Option<MergeArea> {
    let rows = shape.rows as i64;
    let columns = shape.columns as i64;
    let outside = (top < 0 && bottom < 0)
        || (top >= rows && bottom >= rows)
        || (left < 0 && right < 0)
        || (left >= columns && right >= columns);
    if outside {
        return None;
    }
    let clamp = |value: i64, len: i64| value.clamp(0, len - 1) as usize;
    Some(MergeArea::new(
        clamp(top, rows),
        clamp(left, columns),
        clamp(bottom, rows),
        clamp(right, columns),
    ))
}

/// Fit an overlay entry into `shape`. Returns `false` to drop it.
fn clip_entry(entry: &mut OverlayEntry, shape: &Shape) -> bool {
    if entry.table >= shape.tables {
        return false;
    }
    let bb = entry.selection.bounding_box();
    let below = bb.top.is_some_and(|top| top >= shape.rows as i64);
    let right_of = bb.left.is_some_and(|left| left >= shape.columns as i64);
    if below || right_of {
        return false;
    }
    if let Some(Some(area)) = entry.diff.merge_area {
        let rect = (
            area.top as i64,
            area.left as i64,
            area.bottom as i64,
            area.right as i64,
        );
        match clamp_merge_area(rect, shape) {
            Some(clamped) => entry.diff.merge_area = Some(Some(clamped)),
            None => entry.diff.merge_area = None,
        }
    }
    !entry.diff.is_empty()
}
