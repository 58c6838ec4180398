//! Error types for the Tabula engine.

use thiserror::Error;

use crate::attributes::AttributeName;
use crate::key::Axis;

/// A grid shape that cannot be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Shape must have 3 dimensions, got {0}")]
    WrongDimensionality(usize),

    #[error("Shape must have at least one {axis}")]
    ZeroAxis { axis: Axis },

    #[error("Shape has {value} {axis}s, maximum is {max}")]
    ExceedsMaximum { axis: Axis, value: usize, max: usize },
}

/// An attribute value of the wrong shape for its name.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributeTypeError {
    #[error("Unknown attribute {0:?}")]
    UnknownName(String),

    #[error("Attribute {name} expects {expected}, got {found}")]
    WrongType {
        name: AttributeName,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Merge area ({top}, {left}, {bottom}, {right}) is inverted")]
    InvertedMergeArea {
        top: usize,
        left: usize,
        bottom: usize,
        right: usize,
    },
}
