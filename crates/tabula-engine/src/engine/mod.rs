//! Sandboxed cell evaluation.
//!
//! - [`create_cell_engine`] / [`create_script_engine`] - Rhai engines with
//!   the spreadsheet builtins registered
//! - [`evaluate_cell`] - run one cell's code with its coordinates bound
//! - [`Deadline`] - wall-clock limit enforced through the progress hook
//! - [`GridAccess`] - capability through which builtins reach other cells
//! - [`EvalError`] / [`CellResult`] - evaluation outcomes stored as values

mod access;
mod eval;
mod limits;
mod value;

pub use access::{CodeStore, GridAccess};
pub use eval::{
    OutputBuffer, bind_cell, compile_functions, create_cell_engine, create_script_engine,
    evaluate_cell, run_script,
};
pub use limits::{Deadline, DeadlineGuard, install_deadline};
pub use value::{CellResult, EvalError, format_result, format_value};

pub use rhai::{AST, Dynamic, Engine};
