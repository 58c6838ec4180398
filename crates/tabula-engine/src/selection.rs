//! Planar selections of cells.
//!
//! A [`Selection`] is the union of four kinds of members:
//!
//! - rectangular blocks, given as matching top-left / bottom-right corners
//! - whole rows
//! - whole columns
//! - individual cells
//!
//! Coordinates are signed so that shifted selections may address cells
//! before the origin; such cells simply never exist in a grid.

use serde::{Deserialize, Serialize};
use std::ops::{Add, BitAnd};

use crate::key::{Axis, CellKey, Shape};

/// A (row, column) pair.
pub type Coord = (i64, i64);

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub block_tl: Vec<Coord>,
    pub block_br: Vec<Coord>,
    pub rows: Vec<i64>,
    pub cols: Vec<i64>,
    pub cells: Vec<Coord>,
}

/// Bounding box of a selection. Sides a selection does not constrain are `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub top: Option<i64>,
    pub left: Option<i64>,
    pub bottom: Option<i64>,
    pub right: Option<i64>,
}

impl Selection {
    pub fn new(
        block_tl: Vec<Coord>,
        block_br: Vec<Coord>,
        rows: Vec<i64>,
        cols: Vec<i64>,
        cells: Vec<Coord>,
    ) -> Selection {
        Selection {
            block_tl,
            block_br,
            rows,
            cols,
            cells,
        }
    }

    /// Selection of a single rectangular block.
    pub fn block(top: i64, left: i64, bottom: i64, right: i64) -> Selection {
        Selection {
            block_tl: vec![(top, left)],
            block_br: vec![(bottom, right)],
            ..Selection::default()
        }
    }

    pub fn from_rows(rows: impl IntoIterator<Item = i64>) -> Selection {
        Selection {
            rows: rows.into_iter().collect(),
            ..Selection::default()
        }
    }

    pub fn from_cols(cols: impl IntoIterator<Item = i64>) -> Selection {
        Selection {
            cols: cols.into_iter().collect(),
            ..Selection::default()
        }
    }

    pub fn from_cells(cells: impl IntoIterator<Item = Coord>) -> Selection {
        Selection {
            cells: cells.into_iter().collect(),
            ..Selection::default()
        }
    }

    pub fn single(row: i64, col: i64) -> Selection {
        Selection::from_cells([(row, col)])
    }

    fn blocks(&self) -> impl Iterator<Item = (Coord, Coord)> + '_ {
        self.block_tl.iter().copied().zip(self.block_br.iter().copied())
    }

    /// True when no member selects any cell.
    pub fn is_empty(&self) -> bool {
        let no_blocks = self
            .blocks()
            .all(|((top, left), (bottom, right))| top > bottom || left > right);
        no_blocks && self.rows.is_empty() && self.cols.is_empty() && self.cells.is_empty()
    }

    pub fn contains(&self, row: i64, col: i64) -> bool {
        let in_block = self.blocks().any(|((top, left), (bottom, right))| {
            top <= row && row <= bottom && left <= col && col <= right
        });
        in_block
            || self.rows.contains(&row)
            || self.cols.contains(&col)
            || self.cells.contains(&(row, col))
    }

    pub fn contains_key(&self, key: &CellKey) -> bool {
        self.contains(key.row as i64, key.column as i64)
    }

    /// Exactly one individual cell and nothing else.
    pub fn single_cell_selected(&self) -> bool {
        self.block_tl.is_empty()
            && self.block_br.is_empty()
            && self.rows.is_empty()
            && self.cols.is_empty()
            && self.cells.len() == 1
    }

    /// Smallest rectangle containing every member.
    ///
    /// Whole-row members leave left/right open and whole-column members
    /// leave top/bottom open.
    pub fn bounding_box(&self) -> BoundingBox {
        fn lower(slot: &mut Option<i64>, value: i64) {
            if slot.is_none_or(|current| current > value) {
                *slot = Some(value);
            }
        }
        fn raise(slot: &mut Option<i64>, value: i64) {
            if slot.is_none_or(|current| current < value) {
                *slot = Some(value);
            }
        }

        let mut bb = BoundingBox::default();
        for ((top, left), (bottom, right)) in self.blocks() {
            lower(&mut bb.top, top);
            lower(&mut bb.left, left);
            raise(&mut bb.bottom, bottom);
            raise(&mut bb.right, right);
        }
        for &row in &self.rows {
            lower(&mut bb.top, row);
            raise(&mut bb.bottom, row);
        }
        for &col in &self.cols {
            lower(&mut bb.left, col);
            raise(&mut bb.right, col);
        }
        for &(row, col) in &self.cells {
            lower(&mut bb.top, row);
            lower(&mut bb.left, col);
            raise(&mut bb.bottom, row);
            raise(&mut bb.right, col);
        }

        if !self.rows.is_empty() {
            bb.left = None;
            bb.right = None;
        }
        if !self.cols.is_empty() {
            bb.top = None;
            bb.bottom = None;
        }
        bb
    }

    /// Bounding box with open sides filled in from the grid shape.
    ///
    /// Returns `(top, left, bottom, right)`; open bottom/right sides become
    /// the row/column count.
    pub fn grid_bounding_box(&self, shape: &Shape) -> (i64, i64, i64, i64) {
        let bb = self.bounding_box();
        (
            bb.top.unwrap_or(0),
            bb.left.unwrap_or(0),
            bb.bottom.unwrap_or(shape.rows as i64),
            bb.right.unwrap_or(shape.columns as i64),
        )
    }

    /// Copy shifted by `delta_row` rows and `delta_col` columns.
    pub fn shifted(&self, delta_row: i64, delta_col: i64) -> Selection {
        let shift = |&(row, col): &Coord| (row + delta_row, col + delta_col);
        Selection {
            block_tl: self.block_tl.iter().map(shift).collect(),
            block_br: self.block_br.iter().map(shift).collect(),
            rows: self.rows.iter().map(|row| row + delta_row).collect(),
            cols: self.cols.iter().map(|col| col + delta_col).collect(),
            cells: self.cells.iter().map(shift).collect(),
        }
    }

    /// Intersection with `other`.
    ///
    /// Blocks fully inside `other` stay blocks, otherwise their contained
    /// cells are listed. Rows and columns present in both stay; otherwise
    /// the parts of `other`'s blocks and cells lying on them are kept.
    pub fn intersect(&self, other: &Selection) -> Selection {
        let mut result = Selection::default();
        let mut cells: Vec<Coord> = Vec::new();

        for (tl, br) in self.blocks() {
            let mut block_cells = Vec::new();
            for row in tl.0..=br.0 {
                for col in tl.1..=br.1 {
                    if other.contains(row, col) {
                        block_cells.push((row, col));
                    }
                }
            }
            let area = (br.0 + 1 - tl.0).max(0) * (br.1 + 1 - tl.1).max(0);
            if block_cells.len() as i64 == area {
                result.block_tl.push(tl);
                result.block_br.push(br);
            } else {
                cells.extend(block_cells);
            }
        }

        for &row in &self.rows {
            if other.rows.contains(&row) {
                result.rows.push(row);
                continue;
            }
            for ((top, left), (bottom, right)) in other.blocks() {
                if top <= row && row <= bottom {
                    result.block_tl.push((row, left));
                    result.block_br.push((row, right));
                }
            }
            cells.extend(other.cells.iter().filter(|cell| cell.0 == row));
        }

        for &col in &self.cols {
            if other.cols.contains(&col) {
                result.cols.push(col);
                continue;
            }
            for ((top, left), (bottom, right)) in other.blocks() {
                if left <= col && col <= right {
                    result.block_tl.push((top, col));
                    result.block_br.push((bottom, col));
                }
            }
            cells.extend(other.cells.iter().filter(|cell| cell.1 == col));
        }

        cells.extend(
            self.cells
                .iter()
                .filter(|&&(row, col)| other.contains(row, col)),
        );

        for cell in cells {
            if !result.cells.contains(&cell) {
                result.cells.push(cell);
            }
        }
        result
    }

    /// Shift members lying strictly after `point` along `axis` by `count`.
    ///
    /// A negative `count` removes space. Selections are planar, so the
    /// table axis leaves them untouched.
    pub fn insert(&mut self, point: i64, count: i64, axis: Axis) {
        if count == 0 {
            return;
        }
        let shift = |value: i64| if value > point { value + count } else { value };
        match axis {
            Axis::Row => {
                for coord in self
                    .block_tl
                    .iter_mut()
                    .chain(self.block_br.iter_mut())
                    .chain(self.cells.iter_mut())
                {
                    coord.0 = shift(coord.0);
                }
                for row in &mut self.rows {
                    *row = shift(*row);
                }
            }
            Axis::Column => {
                for coord in self
                    .block_tl
                    .iter_mut()
                    .chain(self.block_br.iter_mut())
                    .chain(self.cells.iter_mut())
                {
                    coord.1 = shift(coord.1);
                }
                for col in &mut self.cols {
                    *col = shift(*col);
                }
            }
            Axis::Table => {}
        }
    }

    /// Lazily yield every `(row, column)` inside both the selection and
    /// `shape`, in row-major order.
    pub fn cell_generator<'a>(&'a self, shape: &Shape) -> impl Iterator<Item = (usize, usize)> + 'a {
        let (top, left, bottom, right) = self.grid_bounding_box(shape);
        let top = top.max(0);
        let left = left.max(0);
        let bottom = bottom.min(shape.rows as i64 - 1);
        let right = right.min(shape.columns as i64 - 1);

        (top..=bottom)
            .flat_map(move |row| (left..=right).map(move |col| (row, col)))
            .filter(move |&(row, col)| self.contains(row, col))
            .map(|(row, col)| (row as usize, col as usize))
    }

    /// Keys on `table` for every selected cell inside `shape`.
    ///
    /// Yields nothing when `table` lies outside the shape.
    pub fn cell_keys<'a>(&'a self, shape: &Shape, table: usize) -> impl Iterator<Item = CellKey> + 'a {
        let in_range = table < shape.tables;
        self.cell_generator(shape)
            .filter(move |_| in_range)
            .map(move |(row, col)| CellKey::new(row, col, table))
    }
}

impl Add<(i64, i64)> for &Selection {
    type Output = Selection;

    fn add(self, (delta_row, delta_col): (i64, i64)) -> Selection {
        self.shifted(delta_row, delta_col)
    }
}

impl BitAnd for &Selection {
    type Output = Selection;

    fn bitand(self, other: &Selection) -> Selection {
        self.intersect(other)
    }
}
