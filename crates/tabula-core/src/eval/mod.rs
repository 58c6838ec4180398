//! Cell evaluation with result and frozen caches, safe mode and macros.
//!
//! [`EvalState`] owns the cell engine. Its builtins read the grid back
//! through the state, so `S(row, col, table)` inside one cell, or inside a
//! macro, evaluates (and caches) the referenced cell with that engine.
//! Results, including errors, are cached under the key's string form until
//! something invalidates them.

mod find;

pub use find::FindOptions;

use dashmap::DashMap;
use rhai::{AST, Dynamic, Engine};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use crate::settings::Settings;
use tabula_engine::builtins::ScriptModifications;
use tabula_engine::engine::{
    CellResult, CodeStore, Deadline, EvalError, GridAccess, OutputBuffer, compile_functions,
    create_cell_engine, create_script_engine, evaluate_cell, run_script,
};
use tabula_engine::{CellKey, Shape, SharedOverlay};

/// Reported instead of running macros in safe mode.
pub const SAFE_MODE_MESSAGE: &str = "Safe mode activated. Code not executed.";

/// What a macro run produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MacroOutput {
    /// Everything the script printed.
    pub output: String,
    /// The error that stopped the script, if any.
    pub errors: String,
    /// Cells the script changed: key -> (code before, code after).
    pub modifications: BTreeMap<CellKey, (Option<String>, Option<String>)>,
}

/// State shared between the evaluator and the builtins of its engines.
pub struct EvalState {
    engine: Engine,
    cells: CodeStore,
    attributes: SharedOverlay,
    shape: RwLock<Shape>,
    results: DashMap<String, CellResult>,
    frozen: DashMap<String, CellResult>,
    safe_mode: AtomicBool,
    functions: RwLock<Option<AST>>,
    deadline: Arc<Deadline>,
    in_flight: Mutex<Vec<CellKey>>,
    max_depth: usize,
    evaluations: AtomicU64,
}

/// Pops the in-flight stack when an evaluation ends.
struct InFlight<'a> {
    stack: &'a Mutex<Vec<CellKey>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stack
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
    }
}

impl EvalState {
    fn shape(&self) -> Shape {
        *self.shape.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_results(&self) {
        if !self.results.is_empty() {
            tracing::debug!(cached = self.results.len(), "result cache cleared");
        }
        self.results.clear();
    }

    /// Store code and reset the result cache unless nothing can have changed.
    fn write(&self, key: CellKey, code: Option<&str>) -> Option<String> {
        let code = code.filter(|code| !code.is_empty());
        let cached = self.results.contains_key(&key.cache_key());
        let old = match code {
            Some(code) => self.cells.insert(key, code.to_string()),
            None => self.cells.remove(&key).map(|(_, old)| old),
        };
        let unchanged = match code {
            Some(code) => cached && old.as_deref() == Some(code),
            None => !cached,
        };
        if !unchanged {
            self.clear_results();
        }
        old
    }

    /// Cell covered by a merge area whose anchor is another cell.
    fn is_merged_away(&self, key: &CellKey) -> bool {
        let overlay = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        overlay
            .get_merging_cell(key)
            .is_some_and(|anchor| anchor != *key)
    }

    fn evaluate(&self, key: CellKey) -> Option<CellResult> {
        let attrs = self
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(&key);
        if attrs.button_cell.is_some() {
            return None;
        }

        let cache_key = key.cache_key();
        if attrs.frozen {
            if let Some(result) = self.frozen.get(&cache_key) {
                return Some(result.value().clone());
            }
            // Frozen without a snapshot, e.g. after a reload.
            let result = self.compute(key)?;
            self.frozen.insert(cache_key, result.clone());
            return Some(result);
        }

        if let Some(result) = self.results.get(&cache_key) {
            return Some(result.value().clone());
        }
        let result = self.compute(key)?;
        self.results.insert(cache_key, result.clone());
        Some(result)
    }

    fn compute(&self, key: CellKey) -> Option<CellResult> {
        let code = self.cells.get(&key).map(|code| code.clone())?;
        if self.safe_mode.load(Ordering::Relaxed) {
            return Some(Ok(Dynamic::from(code)));
        }

        let _in_flight = {
            let mut stack = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if stack.contains(&key) {
                return Some(Err(EvalError::CyclicReference(key)));
            }
            if stack.len() >= self.max_depth {
                return Some(Err(EvalError::RecursionLimit(self.max_depth)));
            }
            stack.push(key);
            InFlight {
                stack: &self.in_flight,
            }
        };
        let _deadline = self.deadline.arm();

        let functions = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let result = evaluate_cell(&self.engine, &code, key, functions.as_ref(), self.deadline.limit_ms());
        if let Err(EvalError::Timeout { limit_ms }) = &result {
            tracing::warn!(%key, limit_ms, "cell evaluation timed out");
        }
        Some(result)
    }
}

impl GridAccess for EvalState {
    fn value(&self, key: CellKey) -> Option<CellResult> {
        if !self.shape().contains(&key) {
            return None;
        }
        self.evaluate(key)
    }

    fn code(&self, key: CellKey) -> Option<String> {
        self.cells.get(&key).map(|code| code.clone())
    }

    fn set_code(&self, key: CellKey, code: Option<&str>) -> Option<String> {
        if code.is_some_and(|code| !code.is_empty()) && self.is_merged_away(&key) {
            return self.code(key);
        }
        self.write(key, code)
    }
}

/// Grid handle given to the cell engine. Weak, since the state owns the
/// engine.
struct StateRef(Weak<EvalState>);

impl GridAccess for StateRef {
    fn value(&self, key: CellKey) -> Option<CellResult> {
        self.0.upgrade()?.value(key)
    }

    fn code(&self, key: CellKey) -> Option<String> {
        self.0.upgrade()?.code(key)
    }

    fn set_code(&self, key: CellKey, code: Option<&str>) -> Option<String> {
        self.0.upgrade()?.set_code(key, code)
    }
}

/// Evaluates cells of one grid.
pub struct Evaluator {
    state: Arc<EvalState>,
}

impl Evaluator {
    pub fn new(cells: CodeStore, attributes: SharedOverlay, shape: Shape, settings: &Settings) -> Self {
        let deadline = Deadline::new(settings.timeout());
        let state = Arc::new_cyclic(|state| EvalState {
            engine: create_cell_engine(Arc::new(StateRef(state.clone())), deadline.clone()),
            cells,
            attributes,
            shape: RwLock::new(shape),
            results: DashMap::new(),
            frozen: DashMap::new(),
            safe_mode: AtomicBool::new(false),
            functions: RwLock::new(None),
            deadline: deadline.clone(),
            in_flight: Mutex::new(Vec::new()),
            max_depth: settings.max_recursion_depth.max(1),
            evaluations: AtomicU64::new(0),
        });
        Evaluator { state }
    }

    /// Value of `key`: `None` for empty cells, button cells and keys
    /// outside the grid.
    pub fn value(&self, key: CellKey) -> Option<CellResult> {
        self.state.value(key)
    }

    /// Write code, keeping cached results when nothing changed.
    ///
    /// Returns `false` when the write was ignored because `key` lies inside
    /// another cell's merge area.
    pub fn write_code(&self, key: CellKey, code: Option<&str>) -> bool {
        if code.is_some_and(|code| !code.is_empty()) && self.state.is_merged_away(&key) {
            tracing::debug!(%key, "write into merged cell ignored");
            return false;
        }
        self.state.write(key, code);
        true
    }

    /// Remove the code of `key` and its cached result. Frozen snapshots stay.
    pub fn pop(&self, key: &CellKey) -> Option<String> {
        self.state.results.remove(&key.cache_key());
        self.state.cells.remove(key).map(|(_, code)| code)
    }

    pub fn clear_results(&self) {
        self.state.clear_results();
    }

    pub fn is_cached(&self, key: &CellKey) -> bool {
        self.state.results.contains_key(&key.cache_key())
    }

    /// How many times cell code has actually been run.
    pub fn evaluations(&self) -> u64 {
        self.state.evaluations.load(Ordering::Relaxed)
    }

    pub fn set_shape(&self, shape: Shape) {
        *self.state.shape.write().unwrap_or_else(PoisonError::into_inner) = shape;
        self.state.clear_results();
    }

    pub fn safe_mode(&self) -> bool {
        self.state.safe_mode.load(Ordering::Relaxed)
    }

    /// Returns the previous setting. Cached results are dropped on change.
    pub fn set_safe_mode(&self, safe_mode: bool) -> bool {
        let old = self.state.safe_mode.swap(safe_mode, Ordering::Relaxed);
        if old != safe_mode {
            self.state.clear_results();
        }
        old
    }

    pub fn timeout_ms(&self) -> u64 {
        self.state.deadline.limit_ms()
    }

    pub fn frozen_value(&self, key: &CellKey) -> Option<CellResult> {
        self.state
            .frozen
            .get(&key.cache_key())
            .map(|result| result.value().clone())
    }

    pub fn store_frozen(&self, key: CellKey, result: CellResult) -> Option<CellResult> {
        self.state.frozen.insert(key.cache_key(), result)
    }

    pub fn take_frozen(&self, key: &CellKey) -> Option<CellResult> {
        self.state
            .frozen
            .remove(&key.cache_key())
            .map(|(_, result)| result)
    }

    /// Drop results, frozen snapshots and macro functions.
    pub fn reset(&self) {
        self.state.clear_results();
        self.state.frozen.clear();
        *self.state.functions.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Run the macro script. Functions it defines become available to every
    /// cell; results and frozen snapshots are dropped afterwards.
    pub fn execute_macros(&self, macros: &str) -> MacroOutput {
        if self.safe_mode() {
            return MacroOutput {
                errors: SAFE_MODE_MESSAGE.to_string(),
                ..MacroOutput::default()
            };
        }

        let script = macros.replace("\r\n", "\n");
        let modifications: ScriptModifications = Arc::new(Mutex::new(BTreeMap::new()));
        let output: OutputBuffer = Arc::new(Mutex::new(String::new()));
        let engine = create_script_engine(
            self.state.clone(),
            self.state.deadline.clone(),
            modifications.clone(),
            output.clone(),
        );

        let mut errors = String::new();
        let functions = {
            let _deadline = self.state.deadline.arm();
            match run_script(&engine, &script, self.state.deadline.limit_ms()) {
                Ok((_, ast)) => Some(ast.clone_functions_only()),
                Err(err) => {
                    tracing::warn!(%err, "macro execution failed");
                    errors = err.to_string();
                    // Functions still count when only running failed.
                    compile_functions(&self.state.engine, &script).ok()
                }
            }
        };
        if functions.is_some() {
            *self.state.functions.write().unwrap_or_else(PoisonError::into_inner) = functions;
        }

        self.state.clear_results();
        self.state.frozen.clear();

        let modifications = std::mem::take(
            &mut *modifications.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let output = std::mem::take(&mut *output.lock().unwrap_or_else(PoisonError::into_inner));
        tracing::info!(modified = modifications.len(), failed = !errors.is_empty(), "macros executed");
        MacroOutput {
            output,
            errors,
            modifications,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tabula_engine::attributes::{AttributeDiff, MergeArea};
    use tabula_engine::{AttributeOverlay, OverlayEntry, Selection};

    fn setup_with(settings: &Settings) -> (CodeStore, SharedOverlay, Evaluator) {
        let cells: CodeStore = Arc::new(DashMap::new());
        let overlay: SharedOverlay = Arc::new(RwLock::new(AttributeOverlay::new()));
        let evaluator = Evaluator::new(cells.clone(), overlay.clone(), Shape::new(10, 10, 2), settings);
        (cells, overlay, evaluator)
    }

    fn setup() -> (CodeStore, SharedOverlay, Evaluator) {
        setup_with(&Settings::default())
    }

    fn key(row: usize, column: usize, table: usize) -> CellKey {
        CellKey::new(row, column, table)
    }

    fn int(result: Option<CellResult>) -> i64 {
        result.unwrap().unwrap().as_int().unwrap()
    }

    fn append(overlay: &SharedOverlay, selection: Selection, diff: AttributeDiff) {
        overlay
            .write()
            .unwrap()
            .append(OverlayEntry::new(selection, 0, diff))
            .unwrap();
    }

    #[test]
    fn test_value_is_cached() {
        let (_, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("40 + 2"));
        assert_eq!(int(evaluator.value(key(0, 0, 0))), 42);
        assert_eq!(int(evaluator.value(key(0, 0, 0))), 42);
        assert_eq!(evaluator.evaluations(), 1);
        assert!(evaluator.is_cached(&key(0, 0, 0)));
    }

    #[test]
    fn test_empty_and_outside_cells_have_no_value() {
        let (_, _, evaluator) = setup();
        assert!(evaluator.value(key(1, 1, 0)).is_none());
        evaluator.write_code(key(20, 0, 0), Some("1"));
        assert!(evaluator.value(key(20, 0, 0)).is_none());
    }

    #[test]
    fn test_unchanged_write_keeps_cache() {
        let (_, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("1"));
        evaluator.write_code(key(1, 0, 0), Some("2"));
        evaluator.value(key(0, 0, 0));
        evaluator.value(key(1, 0, 0));

        evaluator.write_code(key(0, 0, 0), Some("1"));
        assert!(evaluator.is_cached(&key(1, 0, 0)));

        evaluator.write_code(key(5, 5, 0), None);
        assert!(evaluator.is_cached(&key(1, 0, 0)));

        evaluator.write_code(key(0, 0, 0), Some("3"));
        assert!(!evaluator.is_cached(&key(1, 0, 0)));
    }

    #[test]
    fn test_dependent_cell_sees_new_value() {
        let (_, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("1"));
        evaluator.write_code(key(0, 1, 0), Some("S(0, 0, 0) * 10"));
        assert_eq!(int(evaluator.value(key(0, 1, 0))), 10);
        evaluator.write_code(key(0, 0, 0), Some("4"));
        assert_eq!(int(evaluator.value(key(0, 1, 0))), 40);
    }

    #[test]
    fn test_errors_are_cached_values() {
        let (_, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("1 +* 2"));
        assert!(matches!(evaluator.value(key(0, 0, 0)), Some(Err(EvalError::Parse(_)))));
        assert!(evaluator.is_cached(&key(0, 0, 0)));
        assert_eq!(evaluator.evaluations(), 1);
    }

    #[test]
    fn test_cycle_is_reported() {
        let (_, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("S(0, 1, 0)"));
        evaluator.write_code(key(0, 1, 0), Some("S(0, 0, 0)"));
        let result = evaluator.value(key(0, 0, 0)).unwrap();
        assert_eq!(result.unwrap_err(), EvalError::CyclicReference(key(0, 0, 0)));
    }

    #[test]
    fn test_recursion_limit() {
        let settings = Settings {
            max_recursion_depth: 3,
            ..Settings::default()
        };
        let (_, _, evaluator) = setup_with(&settings);
        for row in 0..5 {
            evaluator.write_code(key(row, 0, 0), Some(&format!("S({}, 0, 0) + 1", row + 1)));
        }
        let result = evaluator.value(key(0, 0, 0)).unwrap();
        assert_eq!(result.unwrap_err(), EvalError::RecursionLimit(3));
    }

    #[test]
    fn test_timeout() {
        let settings = Settings {
            timeout_ms: 50,
            ..Settings::default()
        };
        let (_, _, evaluator) = setup_with(&settings);
        evaluator.write_code(key(0, 0, 0), Some("let x = 0; while true { x += 1; }"));
        let started = Instant::now();
        let result = evaluator.value(key(0, 0, 0)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(result.unwrap_err(), EvalError::Timeout { limit_ms: 50 });

        // The deadline is disarmed afterwards.
        evaluator.write_code(key(1, 0, 0), Some("1"));
        assert_eq!(int(evaluator.value(key(1, 0, 0))), 1);
    }

    #[test]
    fn test_safe_mode_returns_code() {
        let (_, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("1 + 1"));
        assert_eq!(int(evaluator.value(key(0, 0, 0))), 2);

        assert!(!evaluator.set_safe_mode(true));
        let value = evaluator.value(key(0, 0, 0)).unwrap().unwrap();
        assert_eq!(value.into_string().unwrap(), "1 + 1");
        assert_eq!(evaluator.execute_macros("print(1)").errors, SAFE_MODE_MESSAGE);
    }

    #[test]
    fn test_button_cell_has_no_value() {
        let (_, overlay, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("1"));
        append(&overlay, Selection::single(0, 0), AttributeDiff::button_cell(Some("Go".into())));
        assert!(evaluator.value(key(0, 0, 0)).is_none());
    }

    #[test]
    fn test_frozen_cell_keeps_snapshot() {
        let (_, overlay, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("1"));
        evaluator.store_frozen(key(0, 0, 0), Ok(Dynamic::from(7_i64)));
        append(&overlay, Selection::single(0, 0), AttributeDiff::frozen(true));
        assert_eq!(int(evaluator.value(key(0, 0, 0))), 7);

        // A frozen cell without snapshot is evaluated once.
        evaluator.take_frozen(&key(0, 0, 0));
        assert_eq!(int(evaluator.value(key(0, 0, 0))), 1);
        assert_eq!(int(evaluator.frozen_value(&key(0, 0, 0))), 1);
    }

    #[test]
    fn test_write_into_merged_cell_is_ignored() {
        let (cells, overlay, evaluator) = setup();
        append(
            &overlay,
            Selection::single(0, 0),
            AttributeDiff::merge_area(Some(MergeArea::new(0, 0, 1, 1))),
        );
        assert!(!evaluator.write_code(key(1, 1, 0), Some("5")));
        assert!(cells.get(&key(1, 1, 0)).is_none());
        assert!(evaluator.write_code(key(0, 0, 0), Some("5")));
    }

    #[test]
    fn test_pop_removes_code_and_result() {
        let (_, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("3"));
        evaluator.value(key(0, 0, 0));
        assert_eq!(evaluator.pop(&key(0, 0, 0)).as_deref(), Some("3"));
        assert!(!evaluator.is_cached(&key(0, 0, 0)));
        assert!(evaluator.value(key(0, 0, 0)).is_none());
    }

    #[test]
    fn test_macro_functions_and_output() {
        let (cells, _, evaluator) = setup();
        let out = evaluator.execute_macros("fn triple(x) { x * 3 }\r\nprint(\"ready\");\r\nSET_CODE(2, 2, 0, \"triple(5)\");");
        assert_eq!(out.errors, "");
        assert_eq!(out.output, "ready\n");
        assert_eq!(
            out.modifications.get(&key(2, 2, 0)),
            Some(&(None, Some("triple(5)".to_string())))
        );
        assert_eq!(cells.get(&key(2, 2, 0)).unwrap().as_str(), "triple(5)");
        assert_eq!(int(evaluator.value(key(2, 2, 0))), 15);
    }

    #[test]
    fn test_macro_error_is_reported() {
        let (_, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("1"));
        evaluator.value(key(0, 0, 0));
        let out = evaluator.execute_macros("fn half(x) { x / 2 }\nthrow \"boom\";");
        assert!(out.errors.contains("boom"));
        assert!(!evaluator.is_cached(&key(0, 0, 0)));

        evaluator.write_code(key(1, 0, 0), Some("half(8)"));
        assert_eq!(int(evaluator.value(key(1, 0, 0))), 4);
    }

    #[test]
    fn test_cells_read_by_macros_cannot_write() {
        let (cells, _, evaluator) = setup();
        evaluator.write_code(key(0, 0, 0), Some("SET_CODE(1, 1, 0, \"written\"); 1"));

        // The cell's error value surfaces in the macro.
        let out = evaluator.execute_macros("let v = S(0, 0, 0);");
        assert!(out.errors.contains("SET_CODE"));
        assert!(out.modifications.is_empty());
        assert!(cells.get(&key(1, 1, 0)).is_none());

        // Same outcome as evaluating the cell outside a macro.
        evaluator.clear_results();
        assert!(matches!(evaluator.value(key(0, 0, 0)), Some(Err(EvalError::Runtime(_)))));
        assert!(cells.get(&key(1, 1, 0)).is_none());
    }
}
