//! Built-in functions available to cell code and macros.
//!
//! Conventions:
//! - Builtin names are ALL CAPS (e.g. `S`, `RANDINT`).
//! - Coordinates are passed as `(row, column, table)`.
//! - `RANGE` returns a block as an array of rows; the aggregates (`SUM`,
//!   `AVG`, `MIN`, `MAX`, `COUNT`) accept any array, nested or flat.
//! - Write builtins (`SET_CODE`, `CLEAR_CODE`) exist only on the macro
//!   engine and record every change in [`ScriptModifications`].

use rand::Rng;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Position};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::GridAccess;
use crate::key::CellKey;

/// Largest block `RANGE` will read.
pub const MAX_RANGE_CELLS: usize = 1_000_000;

/// Cells changed by a script: key -> (code before the script, code after).
pub type ScriptModifications = Arc<Mutex<BTreeMap<CellKey, (Option<String>, Option<String>)>>>;

fn invalid_arg(message: &str) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

fn to_key(row: i64, column: i64, table: i64) -> Result<CellKey, Box<EvalAltResult>> {
    let coord = |value: i64, label: &str| {
        usize::try_from(value).map_err(|_| invalid_arg(&format!("{} must be >= 0", label)))
    };
    Ok(CellKey::new(
        coord(row, "row")?,
        coord(column, "column")?,
        coord(table, "table")?,
    ))
}

/// Numeric entries of `values`, descending into nested arrays.
/// Non-numeric entries are skipped.
fn numbers(values: &Array, out: &mut Vec<f64>) {
    for value in values {
        if value.is_array() {
            if let Some(inner) = value.clone().try_cast::<Array>() {
                numbers(&inner, out);
            }
        } else if let Ok(n) = value.as_int() {
            out.push(n as f64);
        } else if let Ok(n) = value.as_float() {
            out.push(n);
        }
    }
}

/// Non-unit entries of `values`, descending into nested arrays.
fn count_filled(values: &Array) -> i64 {
    values
        .iter()
        .map(|value| match value.clone().try_cast::<Array>() {
            Some(inner) => count_filled(&inner),
            None if value.is_unit() => 0,
            None => 1,
        })
        .sum()
}

/// Register the read builtins.
pub fn register_builtins(engine: &mut Engine, grid: Arc<dyn GridAccess>) {
    // S(row, col, table): result of another cell (unit when empty).
    let grid_s = grid.clone();
    engine.register_fn(
        "S",
        move |row: i64, column: i64, table: i64| -> Result<Dynamic, Box<EvalAltResult>> {
            let key = to_key(row, column, table)?;
            match grid_s.value(key) {
                None => Ok(Dynamic::UNIT),
                Some(Ok(value)) => Ok(value),
                Some(Err(err)) => Err(err.into_rhai()),
            }
        },
    );

    // RANGE(r0, c0, r1, c1, table): values of a block as an array of rows,
    // unit for empty cells. Corners may come in any order.
    let grid_range = grid.clone();
    engine.register_fn(
        "RANGE",
        move |r0: i64, c0: i64, r1: i64, c1: i64, table: i64| -> Result<Array, Box<EvalAltResult>> {
            let top = to_key(r0.min(r1), c0.min(c1), table)?;
            let bottom = to_key(r0.max(r1), c0.max(c1), table)?;
            let height = bottom.row - top.row + 1;
            let width = bottom.column - top.column + 1;
            if height.saturating_mul(width) > MAX_RANGE_CELLS {
                return Err(invalid_arg(&format!(
                    "RANGE: more than {} cells",
                    MAX_RANGE_CELLS
                )));
            }

            let mut rows = Array::with_capacity(height);
            for row in top.row..=bottom.row {
                let mut values = Array::with_capacity(width);
                for column in top.column..=bottom.column {
                    match grid_range.value(CellKey::new(row, column, top.table)) {
                        None => values.push(Dynamic::UNIT),
                        Some(Ok(value)) => values.push(value),
                        Some(Err(err)) => return Err(err.into_rhai()),
                    }
                }
                rows.push(Dynamic::from_array(values));
            }
            Ok(rows)
        },
    );

    // SUM / AVG / MIN / MAX over the numbers in an array (0.0 when none).
    engine.register_fn("SUM", |values: Array| -> f64 {
        let mut found = Vec::new();
        numbers(&values, &mut found);
        found.iter().sum()
    });
    engine.register_fn("AVG", |values: Array| -> f64 {
        let mut found = Vec::new();
        numbers(&values, &mut found);
        if found.is_empty() {
            0.0
        } else {
            found.iter().sum::<f64>() / found.len() as f64
        }
    });
    engine.register_fn("MIN", |values: Array| -> f64 {
        let mut found = Vec::new();
        numbers(&values, &mut found);
        found.into_iter().reduce(f64::min).unwrap_or(0.0)
    });
    engine.register_fn("MAX", |values: Array| -> f64 {
        let mut found = Vec::new();
        numbers(&values, &mut found);
        found.into_iter().reduce(f64::max).unwrap_or(0.0)
    });

    // COUNT(array): non-empty entries
    engine.register_fn("COUNT", |values: Array| -> i64 { count_filled(&values) });

    // CODE(row, col, table): source code of another cell (unit when empty).
    engine.register_fn(
        "CODE",
        move |row: i64, column: i64, table: i64| -> Result<Dynamic, Box<EvalAltResult>> {
            let key = to_key(row, column, table)?;
            Ok(grid.code(key).map(Dynamic::from).unwrap_or(Dynamic::UNIT))
        },
    );

    // RAND(): random float in [0, 1)
    engine.register_fn("RAND", || -> f64 { rand::thread_rng().r#gen() });

    // RANDINT(min, max): random integer in [min, max] inclusive
    engine.register_fn(
        "RANDINT",
        |min: i64, max: i64| -> Result<i64, Box<EvalAltResult>> {
            if min > max {
                return Err(invalid_arg("RANDINT: min must be <= max"));
            }
            Ok(rand::thread_rng().r#gen_range(min..=max))
        },
    );

    // NOW(): local date and time, RFC 3339
    engine.register_fn("NOW", || -> String { chrono::Local::now().to_rfc3339() });

    // TODAY(): local date, YYYY-MM-DD
    engine.register_fn("TODAY", || -> String {
        chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
    });
}

fn record(modifications: &ScriptModifications, key: CellKey, old: Option<String>, new: Option<String>) {
    let mut mods = modifications.lock().unwrap_or_else(PoisonError::into_inner);
    mods.entry(key)
        .and_modify(|(_, current)| *current = new.clone())
        .or_insert((old, new));
}

/// Register the write builtins used by macros.
pub fn register_script_builtins(
    engine: &mut Engine,
    grid: Arc<dyn GridAccess>,
    modifications: ScriptModifications,
) {
    // SET_CODE(row, col, table, code): strings are stored verbatim, other
    // values as their display form.
    let grid_set = grid.clone();
    let mods_set = modifications.clone();
    engine.register_fn(
        "SET_CODE",
        move |row: i64, column: i64, table: i64, code: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let key = to_key(row, column, table)?;
            let code = if code.is_string() {
                code.into_string().unwrap_or_default()
            } else {
                code.to_string()
            };
            let old = grid_set.set_code(key, Some(&code));
            record(&mods_set, key, old, Some(code));
            Ok(())
        },
    );

    // CLEAR_CODE(row, col, table)
    engine.register_fn(
        "CLEAR_CODE",
        move |row: i64, column: i64, table: i64| -> Result<(), Box<EvalAltResult>> {
            let key = to_key(row, column, table)?;
            let old = grid.set_code(key, None);
            record(&modifications, key, old, None);
            Ok(())
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CellResult, CodeStore, EvalError};
    use dashmap::DashMap;

    struct Fixed {
        cells: CodeStore,
    }

    impl GridAccess for Fixed {
        fn value(&self, key: CellKey) -> Option<CellResult> {
            let code = self.cells.get(&key)?.clone();
            Some(match code.parse::<i64>() {
                Ok(n) => Ok(Dynamic::from(n)),
                Err(_) => Err(EvalError::Runtime(format!("bad {}", code))),
            })
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

    fn setup() -> (CodeStore, Arc<dyn GridAccess>) {
        let cells: CodeStore = Arc::new(DashMap::new());
        let access: Arc<dyn GridAccess> = Arc::new(Fixed {
            cells: cells.clone(),
        });
        (cells, access)
    }

    #[test]
    fn test_s_reads_value_and_empty_is_unit() {
        let (cells, grid) = setup();
        cells.insert(CellKey::new(1, 2, 0), "7".to_string());
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);

        assert_eq!(engine.eval::<i64>("S(1, 2, 0) * 6").unwrap(), 42);
        assert!(engine.eval::<Dynamic>("S(5, 5, 0)").unwrap().is_unit());
    }

    #[test]
    fn test_s_propagates_error_value() {
        let (cells, grid) = setup();
        cells.insert(CellKey::new(0, 0, 0), "oops".to_string());
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);

        let err = engine.eval::<Dynamic>("S(0, 0, 0)").unwrap_err();
        assert_eq!(
            EvalError::from_rhai(err, 1000),
            EvalError::Runtime("bad oops".to_string())
        );
    }

    #[test]
    fn test_negative_coordinates_rejected() {
        let (_, grid) = setup();
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);
        assert!(engine.eval::<Dynamic>("S(-1, 0, 0)").is_err());
        assert!(engine.eval::<Dynamic>("CODE(0, -1, 0)").is_err());
    }

    #[test]
    fn test_code_returns_source() {
        let (cells, grid) = setup();
        cells.insert(CellKey::new(0, 0, 0), "1 + 1".to_string());
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);
        assert_eq!(engine.eval::<String>("CODE(0, 0, 0)").unwrap(), "1 + 1");
    }

    #[test]
    fn test_range_returns_rows() {
        let (cells, grid) = setup();
        cells.insert(CellKey::new(1, 1, 0), "1".to_string());
        cells.insert(CellKey::new(1, 2, 0), "2".to_string());
        cells.insert(CellKey::new(2, 2, 0), "4".to_string());
        cells.insert(CellKey::new(2, 2, 1), "100".to_string());
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);

        let rows = engine.eval::<Array>("RANGE(2, 2, 1, 1, 0)").unwrap();
        assert_eq!(rows.len(), 2);
        let first = rows[0].clone().into_array().unwrap();
        assert_eq!(first[0].as_int().unwrap(), 1);
        assert_eq!(first[1].as_int().unwrap(), 2);
        let second = rows[1].clone().into_array().unwrap();
        assert!(second[0].is_unit());
        assert_eq!(second[1].as_int().unwrap(), 4);
    }

    #[test]
    fn test_range_aggregates() {
        let (cells, grid) = setup();
        for (row, code) in ["3", "9", "6"].iter().enumerate() {
            cells.insert(CellKey::new(row, 0, 0), code.to_string());
        }
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);

        assert_eq!(engine.eval::<f64>("SUM(RANGE(0, 0, 3, 1, 0))").unwrap(), 18.0);
        assert_eq!(engine.eval::<f64>("AVG(RANGE(0, 0, 3, 0, 0))").unwrap(), 6.0);
        assert_eq!(engine.eval::<f64>("MIN(RANGE(0, 0, 2, 0, 0))").unwrap(), 3.0);
        assert_eq!(engine.eval::<f64>("MAX(RANGE(0, 0, 2, 0, 0))").unwrap(), 9.0);
        assert_eq!(engine.eval::<i64>("COUNT(RANGE(0, 0, 3, 1, 0))").unwrap(), 3);
        assert_eq!(engine.eval::<f64>("SUM([1, 2.5, \"x\", [3]])").unwrap(), 6.5);
        assert_eq!(engine.eval::<f64>("MAX([])").unwrap(), 0.0);
    }

    #[test]
    fn test_range_errors() {
        let (cells, grid) = setup();
        cells.insert(CellKey::new(0, 1, 0), "oops".to_string());
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);

        let err = engine.eval::<Dynamic>("RANGE(0, 0, 0, 2, 0)").unwrap_err();
        assert_eq!(
            EvalError::from_rhai(err, 1000),
            EvalError::Runtime("bad oops".to_string())
        );
        assert!(engine.eval::<Dynamic>("RANGE(-1, 0, 0, 0, 0)").is_err());
        assert!(engine.eval::<Dynamic>("RANGE(0, 0, 100000, 100000, 0)").is_err());
    }

    #[test]
    fn test_randint_bounds() {
        let (_, grid) = setup();
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);
        for _ in 0..20 {
            let n = engine.eval::<i64>("RANDINT(3, 5)").unwrap();
            assert!((3..=5).contains(&n));
        }
        assert!(engine.eval::<i64>("RANDINT(5, 3)").is_err());
        let r = engine.eval::<f64>("RAND()").unwrap();
        assert!((0.0..1.0).contains(&r));
    }

    #[test]
    fn test_today_format() {
        let (_, grid) = setup();
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid);
        let today = engine.eval::<String>("TODAY()").unwrap();
        assert_eq!(today.len(), 10);
        assert_eq!(&today[4..5], "-");
    }

    #[test]
    fn test_script_builtins_track_modifications() {
        let (cells, grid) = setup();
        cells.insert(CellKey::new(0, 0, 0), "1".to_string());
        let modifications: ScriptModifications = Arc::new(Mutex::new(BTreeMap::new()));
        let mut engine = Engine::new();
        register_builtins(&mut engine, grid.clone());
        register_script_builtins(&mut engine, grid, modifications.clone());

        engine
            .run(r#"SET_CODE(0, 0, 0, "2"); SET_CODE(0, 0, 0, 3); SET_CODE(1, 0, 0, "x"); CLEAR_CODE(1, 0, 0);"#)
            .unwrap();

        assert_eq!(cells.get(&CellKey::new(0, 0, 0)).unwrap().as_str(), "3");
        assert!(cells.get(&CellKey::new(1, 0, 0)).is_none());

        let mods = modifications.lock().unwrap();
        assert_eq!(
            mods.get(&CellKey::new(0, 0, 0)),
            Some(&(Some("1".to_string()), Some("3".to_string())))
        );
        assert_eq!(mods.get(&CellKey::new(1, 0, 0)), Some(&(None, None)));
    }
}
