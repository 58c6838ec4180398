//! Rhai engine creation and cell evaluation.
//!
//! Cell engines get the read builtins (`S`, `CODE`, `RAND`, ...); the script
//! engine used for macros additionally gets the write builtins and captures
//! `print`/`debug` output. Both stop at the shared [`Deadline`].

use rhai::{AST, Dynamic, Engine, Scope};
use std::sync::{Arc, Mutex, PoisonError};

use super::access::GridAccess;
use super::limits::{Deadline, install_deadline};
use super::value::{CellResult, EvalError};
use crate::builtins::{ScriptModifications, register_builtins, register_script_builtins};
use crate::key::CellKey;

/// Text printed by a macro script.
pub type OutputBuffer = Arc<Mutex<String>>;

/// Create a Rhai engine for evaluating cells.
pub fn create_cell_engine(grid: Arc<dyn GridAccess>, deadline: Arc<Deadline>) -> Engine {
    let mut engine = Engine::new();
    register_builtins(&mut engine, grid);
    install_deadline(&mut engine, deadline);
    engine.on_print(|text| tracing::debug!(target: "tabula::cell", "{}", text));
    engine.on_debug(|text, _, pos| tracing::debug!(target: "tabula::cell", ?pos, "{}", text));
    engine
}

/// Create a Rhai engine for running macros, with write builtins and
/// captured output.
pub fn create_script_engine(
    grid: Arc<dyn GridAccess>,
    deadline: Arc<Deadline>,
    modifications: ScriptModifications,
    output: OutputBuffer,
) -> Engine {
    let mut engine = Engine::new();
    register_builtins(&mut engine, grid.clone());
    register_script_builtins(&mut engine, grid, modifications);
    install_deadline(&mut engine, deadline);

    let print_out = output.clone();
    engine.on_print(move |text| {
        let mut out = print_out.lock().unwrap_or_else(PoisonError::into_inner);
        out.push_str(text);
        out.push('\n');
    });
    engine.on_debug(move |text, _, _| {
        let mut out = output.lock().unwrap_or_else(PoisonError::into_inner);
        out.push_str(text);
        out.push('\n');
    });
    engine
}

/// Scope with the coordinates of `key` bound as read-only constants:
/// `X`/`R` (row), `Y`/`C` (column) and `Z`/`T` (table).
pub fn bind_cell(key: CellKey) -> Scope<'static> {
    let mut scope = Scope::new();
    let (row, column, table) = (key.row as i64, key.column as i64, key.table as i64);
    scope.push_constant("X", row);
    scope.push_constant("Y", column);
    scope.push_constant("Z", table);
    scope.push_constant("R", row);
    scope.push_constant("C", column);
    scope.push_constant("T", table);
    scope
}

/// Compile `script` and keep only the functions it defines.
pub fn compile_functions(engine: &Engine, script: &str) -> Result<AST, EvalError> {
    let ast = engine.compile(script)?;
    Ok(ast.clone_functions_only())
}

/// Evaluate the code of `key`. The value of the last expression is the
/// result; code ending in a statement yields unit.
///
/// `functions` holds user-defined functions made available to the code.
pub fn evaluate_cell(
    engine: &Engine,
    code: &str,
    key: CellKey,
    functions: Option<&AST>,
    limit_ms: u64,
) -> CellResult {
    let mut scope = bind_cell(key);
    let ast = engine.compile_with_scope(&scope, code)?;
    let ast = match functions {
        Some(lib) => lib.merge(&ast),
        None => ast,
    };
    engine
        .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
        .map_err(|err| EvalError::from_rhai(err, limit_ms))
}

/// Run a whole script (macros) and return its final value.
pub fn run_script(engine: &Engine, script: &str, limit_ms: u64) -> Result<(Dynamic, AST), EvalError> {
    let ast = engine.compile(script)?;
    let value = engine
        .eval_ast::<Dynamic>(&ast)
        .map_err(|err| EvalError::from_rhai(err, limit_ms))?;
    Ok((value, ast))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CodeStore, Deadline};
    use dashmap::DashMap;
    use std::time::Duration;

    /// Reads code straight from a store and evaluates it without builtins.
    struct StoreAccess {
        cells: CodeStore,
    }

    impl GridAccess for StoreAccess {
        fn value(&self, key: CellKey) -> Option<CellResult> {
            let code = self.cells.get(&key)?.clone();
            Some(evaluate_cell(&Engine::new(), &code, key, None, 1000))
        }

        fn code(&self, key: CellKey) -> Option<String> {
            self.cells.get(&key).map(|code| code.clone())
        }

        fn set_code(&self, key: CellKey, code: Option<&str>) -> Option<String> {
            match code {
                Some(code) => self.cells.insert(key, code.to_string()),
                None => self.cells.remove(&key).map(|(_, old)| old),
            }
        }
    }

    fn setup(limit_ms: u64) -> (CodeStore, Engine, Arc<Deadline>) {
        let cells: CodeStore = Arc::new(DashMap::new());
        let deadline = Deadline::new(Duration::from_millis(limit_ms));
        let engine = create_cell_engine(Arc::new(StoreAccess { cells: cells.clone() }), deadline.clone());
        (cells, engine, deadline)
    }

    #[test]
    fn test_coordinates_are_bound() {
        let (_, engine, _) = setup(1000);
        let key = CellKey::new(3, 4, 1);
        let result = evaluate_cell(&engine, "[X, Y, Z, R, C, T]", key, None, 1000).unwrap();
        let values: Vec<i64> = result
            .into_array()
            .unwrap()
            .into_iter()
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(values, vec![3, 4, 1, 3, 4, 1]);
    }

    #[test]
    fn test_coordinates_are_read_only() {
        let (_, engine, _) = setup(1000);
        let result = evaluate_cell(&engine, "X = 5; X", CellKey::new(0, 0, 0), None, 1000);
        assert!(result.is_err());
    }

    #[test]
    fn test_statement_yields_unit() {
        let (_, engine, _) = setup(1000);
        let result = evaluate_cell(&engine, "let a = 1;", CellKey::new(0, 0, 0), None, 1000).unwrap();
        assert!(result.is_unit());
    }

    #[test]
    fn test_parse_error_is_value() {
        let (_, engine, _) = setup(1000);
        let result = evaluate_cell(&engine, "1 +* 2", CellKey::new(0, 0, 0), None, 1000);
        assert!(matches!(result, Err(EvalError::Parse(_))));
    }

    #[test]
    fn test_reads_other_cells() {
        let (cells, engine, _) = setup(1000);
        cells.insert(CellKey::new(0, 0, 0), "40".to_string());
        let result = evaluate_cell(&engine, "S(0, 0, 0) + 2", CellKey::new(1, 0, 0), None, 1000).unwrap();
        assert_eq!(result.as_int().unwrap(), 42);
    }

    #[test]
    fn test_functions_are_merged() {
        let (_, engine, _) = setup(1000);
        let lib = compile_functions(&engine, "fn double(x) { x * 2 } 99").unwrap();
        let result = evaluate_cell(&engine, "double(21)", CellKey::new(0, 0, 0), Some(&lib), 1000).unwrap();
        assert_eq!(result.as_int().unwrap(), 42);
    }

    #[test]
    fn test_infinite_loop_times_out() {
        let (_, engine, deadline) = setup(30);
        let _guard = deadline.arm();
        let result = evaluate_cell(&engine, "let x = 0; while true { x += 1; }", CellKey::new(0, 0, 0), None, 30);
        assert_eq!(result.unwrap_err(), EvalError::Timeout { limit_ms: 30 });
    }
}
