use dashmap::DashMap;
use std::sync::Arc;

use super::value::CellResult;
use crate::key::CellKey;

/// Sparse cell store: an absent key is an empty cell.
pub type CodeStore = Arc<DashMap<CellKey, String>>;

/// What builtins may do to the grid they run against.
///
/// Cell engines only read; the macro engine also writes through
/// [`GridAccess::set_code`]. Referenced cells are always evaluated by the
/// implementor's own cell engine, never by the engine of the caller.
pub trait GridAccess: Send + Sync {
    /// Value of `key`, evaluating it if needed.
    /// `None` for empty cells and keys outside the grid.
    fn value(&self, key: CellKey) -> Option<CellResult>;

    fn code(&self, key: CellKey) -> Option<String>;

    /// Replace (or with `None`, clear) the code of `key`, returning the
    /// previous code.
    fn set_code(&self, key: CellKey, code: Option<&str>) -> Option<String>;
}
