//! Evaluation outcomes.

use rhai::{Dynamic, EvalAltResult, ParseError};
use thiserror::Error;

use crate::key::CellKey;

/// Why a cell produced no value. Stored in the result cache like any value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Runtime(String),

    #[error("Evaluation exceeded {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error("Cyclic reference through cell {0}")]
    CyclicReference(CellKey),

    #[error("Evaluation nested deeper than {0} cells")]
    RecursionLimit(usize),
}

/// Outcome of evaluating one cell.
pub type CellResult = Result<Dynamic, EvalError>;

impl EvalError {
    /// Map a Rhai error to an evaluation outcome.
    ///
    /// Errors raised inside called functions are unwrapped to their cause,
    /// termination by the progress hook becomes [`EvalError::Timeout`], and
    /// an [`EvalError`] thrown by a builtin is passed through unchanged.
    pub fn from_rhai(err: Box<EvalAltResult>, limit_ms: u64) -> EvalError {
        match *err {
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
            | EvalAltResult::ErrorInModule(_, inner, _) => EvalError::from_rhai(inner, limit_ms),
            EvalAltResult::ErrorTerminated(_, _) => EvalError::Timeout { limit_ms },
            EvalAltResult::ErrorParsing(parse_type, _) => EvalError::Parse(parse_type.to_string()),
            EvalAltResult::ErrorRuntime(value, pos) => {
                if value.is::<EvalError>() {
                    value.cast::<EvalError>()
                } else {
                    EvalError::Runtime(EvalAltResult::ErrorRuntime(value, pos).to_string())
                }
            }
            other => EvalError::Runtime(other.to_string()),
        }
    }

    /// Wrap this error so it can cross a builtin boundary.
    pub fn into_rhai(self) -> Box<EvalAltResult> {
        EvalAltResult::ErrorRuntime(Dynamic::from(self), rhai::Position::NONE).into()
    }
}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        EvalError::Parse(err.to_string())
    }
}

/// Display form of a value. Unit is empty.
pub fn format_value(value: &Dynamic) -> String {
    if value.is_unit() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Display form of a result; errors render as `#ERR: <message>`.
pub fn format_result(result: &CellResult) -> String {
    match result {
        Ok(value) => format_value(value),
        Err(err) => format!("#ERR: {}", err),
    }
}
