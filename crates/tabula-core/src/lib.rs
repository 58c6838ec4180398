//! tabula-core - grid container, structural editing, evaluation and undo.

pub mod document;
pub mod error;
pub mod eval;
pub mod grid;
pub mod history;
pub mod settings;
pub mod sheet;

pub use document::Document;
pub use error::{Result, StructuralBoundsError, TabulaError};
pub use eval::{Evaluator, FindOptions, MacroOutput, SAFE_MODE_MESSAGE};
pub use grid::{Discarded, Grid, SizeMap};
pub use history::{Command, CommandBox, History};
pub use settings::Settings;
pub use sheet::{GridSnapshot, Sheet};
