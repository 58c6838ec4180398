//! tabula-engine - cell keys, selections, attribute overlay and the Rhai sandbox.

pub mod attributes;
pub mod builtins;
pub mod engine;
pub mod error;
pub mod key;
pub mod overlay;
pub mod selection;

pub use attributes::{
    AttrValue, AttributeDiff, AttributeName, CellAttributes, Color, FontStyle, FontWeight,
    Justification, MergeArea, Renderer, VerticalAlign,
};
pub use error::{AttributeTypeError, ShapeError};
pub use key::{Axis, CellKey, Shape};
pub use overlay::{AppendOutcome, AttributeOverlay, OverlayEntry, SharedOverlay};
pub use selection::{BoundingBox, Selection};
