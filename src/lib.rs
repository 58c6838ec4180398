//! tabula - multi-table spreadsheet model with Rhai-powered cells.
//!
//! Cells hold Rhai code, evaluated on demand with `X`/`Y`/`Z` bound to the
//! cell's coordinates and `S(row, col, table)` reading other cells.
//! Formatting lives in an ordered attribute overlay; every edit can go
//! through an undo history.
//!
//! ```
//! use tabula::{CellKey, Settings, Sheet};
//!
//! let mut sheet = Sheet::new(Settings::default()).unwrap();
//! sheet.set_code(CellKey::new(0, 0, 0), Some("6 * 7")).unwrap();
//! sheet.set_code(CellKey::new(1, 0, 0), Some("S(0, 0, 0) + X")).unwrap();
//! assert_eq!(sheet.display_value(CellKey::new(1, 0, 0)), "43");
//! ```

pub use tabula_core::history::{
    DeleteCommand, FreezeCommand, InsertCommand, ResizeCommand, ResizeGridCommand,
    SetAttributeCommand, SetCodeCommand, ThawCommand,
};
pub use tabula_core::{
    Command, CommandBox, Discarded, Document, Evaluator, FindOptions, Grid, GridSnapshot, History,
    MacroOutput, Result, SAFE_MODE_MESSAGE, Settings, Sheet, SizeMap, StructuralBoundsError,
    TabulaError,
};
pub use tabula_engine::engine::{CellResult, EvalError, format_result, format_value};
pub use tabula_engine::{
    AppendOutcome, AttrValue, AttributeDiff, AttributeName, AttributeOverlay, AttributeTypeError,
    Axis, BoundingBox, CellAttributes, CellKey, Color, FontStyle, FontWeight, Justification,
    MergeArea, OverlayEntry, Renderer, Selection, Shape, ShapeError, VerticalAlign,
};
