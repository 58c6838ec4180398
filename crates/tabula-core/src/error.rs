//! Error types for Tabula core.

use thiserror::Error;

use tabula_engine::{AttributeTypeError, Axis, CellKey, ShapeError};

/// A structural edit addressed rows, columns or tables that do not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralBoundsError {
    #[error("Cannot {operation} at {axis} {point}: grid has {len} {axis}s")]
    PointOutOfRange {
        operation: &'static str,
        axis: Axis,
        point: i64,
        len: usize,
    },

    #[error("Cannot delete {count} {axis}s at {point}: grid has {len} {axis}s")]
    PastEnd {
        axis: Axis,
        point: usize,
        count: usize,
        len: usize,
    },

    #[error("Last {axis} must not be deleted")]
    DeleteAll { axis: Axis },

    #[error("Table {table} does not exist")]
    NoSuchTable { table: usize },
}

/// Errors that can occur in the Tabula core.
#[derive(Error, Debug)]
pub enum TabulaError {
    #[error("Invalid shape: {0}")]
    Shape(#[from] ShapeError),

    #[error("Invalid attribute: {0}")]
    AttributeType(#[from] AttributeTypeError),

    #[error("Invalid structural edit: {0}")]
    Bounds(#[from] StructuralBoundsError),

    #[error("Cell {0} is outside the grid")]
    CellOutOfBounds(CellKey),

    #[error("Size override for {axis} {index} of table {table} is outside the grid")]
    SizeOutOfBounds {
        axis: Axis,
        index: usize,
        table: usize,
    },

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TabulaError>;
