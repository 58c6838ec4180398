//! Cell addressing: keys, axes and grid shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ShapeError;

/// One of the three grid dimensions.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Row,
    Column,
    Table,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Row, Axis::Column, Axis::Table];

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Row => "row",
            Axis::Column => "column",
            Axis::Table => "table",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Address of a single cell (0-indexed).
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct CellKey {
    pub row: usize,
    pub column: usize,
    pub table: usize,
}

impl CellKey {
    pub const fn new(row: usize, column: usize, table: usize) -> CellKey {
        CellKey { row, column, table }
    }

    /// Stable string form used to key the result and frozen caches.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }

    /// Coordinate of this key along `axis`.
    pub fn coord(&self, axis: Axis) -> usize {
        match axis {
            Axis::Row => self.row,
            Axis::Column => self.column,
            Axis::Table => self.table,
        }
    }

    /// Copy of this key with the coordinate along `axis` replaced.
    pub fn with_coord(&self, axis: Axis, value: usize) -> CellKey {
        let mut key = *self;
        match axis {
            Axis::Row => key.row = value,
            Axis::Column => key.column = value,
            Axis::Table => key.table = value,
        }
        key
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.row, self.column, self.table)
    }
}

impl From<(usize, usize, usize)> for CellKey {
    fn from((row, column, table): (usize, usize, usize)) -> Self {
        CellKey::new(row, column, table)
    }
}

/// Extent of the grid: number of rows, columns and tables.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
    pub tables: usize,
}

impl Shape {
    /// Build a shape without validation. Use [`Shape::checked`] before
    /// handing a user-provided shape to a grid.
    pub const fn new(rows: usize, columns: usize, tables: usize) -> Shape {
        Shape {
            rows,
            columns,
            tables,
        }
    }

    /// Build a shape from a slice such as `[rows, columns, tables]`.
    pub fn from_slice(dims: &[usize], max: &Shape) -> Result<Shape, ShapeError> {
        match dims {
            [rows, columns, tables] => Shape::new(*rows, *columns, *tables).checked(max),
            _ => Err(ShapeError::WrongDimensionality(dims.len())),
        }
    }

    /// Validate every axis against `1..=max`.
    pub fn checked(self, max: &Shape) -> Result<Shape, ShapeError> {
        for axis in Axis::ALL {
            let value = self.len(axis);
            if value == 0 {
                return Err(ShapeError::ZeroAxis { axis });
            }
            let limit = max.len(axis);
            if value > limit {
                return Err(ShapeError::ExceedsMaximum {
                    axis,
                    value,
                    max: limit,
                });
            }
        }
        Ok(self)
    }

    pub fn len(&self, axis: Axis) -> usize {
        match axis {
            Axis::Row => self.rows,
            Axis::Column => self.columns,
            Axis::Table => self.tables,
        }
    }

    pub fn with_len(&self, axis: Axis, len: usize) -> Shape {
        let mut shape = *self;
        match axis {
            Axis::Row => shape.rows = len,
            Axis::Column => shape.columns = len,
            Axis::Table => shape.tables = len,
        }
        shape
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        key.row < self.rows && key.column < self.columns && key.table < self.tables
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.rows, self.columns, self.tables)
    }
}
