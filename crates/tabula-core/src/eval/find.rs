//! Text search over cell code and results.

use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

use super::Evaluator;
use tabula_engine::CellKey;
use tabula_engine::engine::format_result;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub case_sensitive: bool,
    /// Match whole words only.
    pub whole_word: bool,
    /// Treat the search text as a regular expression.
    pub regex: bool,
    /// Also match the formatted result of each cell.
    pub include_results: bool,
    /// Search towards the top-left.
    pub backward: bool,
}

enum Matcher {
    Pattern(Regex),
    Plain { needle: String, case_sensitive: bool },
}

impl Matcher {
    /// `None` when the pattern does not compile.
    fn new(text: &str, options: &FindOptions) -> Option<Matcher> {
        let pattern = if options.regex {
            text.to_string()
        } else if options.whole_word {
            format!(r"\b{}\b", regex::escape(text))
        } else {
            return Some(Matcher::Plain {
                needle: if options.case_sensitive {
                    text.to_string()
                } else {
                    text.to_lowercase()
                },
                case_sensitive: options.case_sensitive,
            });
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(!options.case_sensitive)
            .build()
            .map(Matcher::Pattern)
            .ok()
    }

    fn is_match(&self, haystack: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(haystack),
            Matcher::Plain {
                needle,
                case_sensitive: true,
            } => haystack.contains(needle.as_str()),
            Matcher::Plain { needle, .. } => haystack.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// Column-major order: column, then row.
fn search_order(a: &CellKey, b: &CellKey) -> Ordering {
    (a.column, a.row).cmp(&(b.column, b.row))
}

impl Evaluator {
    /// Next cell after `start` (in `start`'s table) whose code, or result
    /// when requested, contains `text`. Wraps around; `start` itself is
    /// checked last.
    pub fn find_next(&self, start: CellKey, text: &str, options: &FindOptions) -> Option<CellKey> {
        let matcher = Matcher::new(text, options)?;

        let mut keys: Vec<CellKey> = self
            .state
            .cells
            .iter()
            .map(|entry| *entry.key())
            .filter(|key| key.table == start.table)
            .collect();
        keys.sort_by(search_order);
        if options.backward {
            keys.reverse();
        }
        let past_start = |key: &CellKey| match search_order(key, &start) {
            Ordering::Greater => !options.backward,
            Ordering::Less => options.backward,
            Ordering::Equal => false,
        };
        let split = keys.iter().position(past_start).unwrap_or(keys.len());
        keys.rotate_left(split);

        keys.into_iter().find(|key| self.matches(*key, &matcher, options))
    }

    fn matches(&self, key: CellKey, matcher: &Matcher, options: &FindOptions) -> bool {
        let code = self.state.cells.get(&key).map(|code| code.clone());
        if code.as_deref().is_some_and(|code| matcher.is_match(code)) {
            return true;
        }
        options.include_results
            && self
                .value(key)
                .is_some_and(|result| matcher.is_match(&format_result(&result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use dashmap::DashMap;
    use std::sync::{Arc, RwLock};
    use tabula_engine::engine::CodeStore;
    use tabula_engine::{AttributeOverlay, Shape};

    fn setup(cells: &[((usize, usize, usize), &str)]) -> Evaluator {
        let store: CodeStore = Arc::new(DashMap::new());
        for &(key, code) in cells {
            store.insert(CellKey::from(key), code.to_string());
        }
        Evaluator::new(
            store,
            Arc::new(RwLock::new(AttributeOverlay::new())),
            Shape::new(10, 10, 2),
            &Settings::default(),
        )
    }

    fn key(row: usize, column: usize, table: usize) -> CellKey {
        CellKey::new(row, column, table)
    }

    #[test]
    fn test_column_major_order_with_wrap() {
        let evaluator = setup(&[
            ((0, 1, 0), "\"apple\""),
            ((5, 0, 0), "\"apple pie\""),
            ((2, 0, 0), "\"apple\""),
        ]);
        let options = FindOptions::default();
        assert_eq!(evaluator.find_next(key(2, 0, 0), "apple", &options), Some(key(5, 0, 0)));
        assert_eq!(evaluator.find_next(key(5, 0, 0), "apple", &options), Some(key(0, 1, 0)));
        assert_eq!(evaluator.find_next(key(0, 1, 0), "apple", &options), Some(key(2, 0, 0)));
    }

    #[test]
    fn test_backward() {
        let evaluator = setup(&[((1, 0, 0), "\"x\""), ((3, 0, 0), "\"x\""), ((0, 2, 0), "\"x\"")]);
        let options = FindOptions {
            backward: true,
            ..FindOptions::default()
        };
        assert_eq!(evaluator.find_next(key(3, 0, 0), "x", &options), Some(key(1, 0, 0)));
        assert_eq!(evaluator.find_next(key(1, 0, 0), "x", &options), Some(key(0, 2, 0)));
    }

    #[test]
    fn test_start_cell_is_checked_last() {
        let evaluator = setup(&[((4, 4, 0), "\"only\"")]);
        let options = FindOptions::default();
        assert_eq!(evaluator.find_next(key(4, 4, 0), "only", &options), Some(key(4, 4, 0)));
    }

    #[test]
    fn test_other_tables_are_skipped() {
        let evaluator = setup(&[((0, 0, 1), "\"needle\"")]);
        assert_eq!(evaluator.find_next(key(0, 0, 0), "needle", &FindOptions::default()), None);
    }

    #[test]
    fn test_case_and_whole_word() {
        let evaluator = setup(&[((0, 0, 0), "\"Catalog\""), ((1, 0, 0), "\"the cat\"")]);
        let mut options = FindOptions::default();
        assert_eq!(evaluator.find_next(key(1, 0, 0), "CAT", &options), Some(key(0, 0, 0)));

        options.whole_word = true;
        assert_eq!(evaluator.find_next(key(1, 0, 0), "cat", &options), Some(key(1, 0, 0)));

        options.whole_word = false;
        options.case_sensitive = true;
        assert_eq!(evaluator.find_next(key(0, 0, 0), "CAT", &options), None);
    }

    #[test]
    fn test_results_are_searched_on_request() {
        let evaluator = setup(&[((0, 0, 0), "6 * 7")]);
        let mut options = FindOptions::default();
        assert_eq!(evaluator.find_next(key(0, 0, 0), "42", &options), None);
        options.include_results = true;
        assert_eq!(evaluator.find_next(key(0, 0, 0), "42", &options), Some(key(0, 0, 0)));
    }

    #[test]
    fn test_invalid_regex_matches_nothing() {
        let evaluator = setup(&[((0, 0, 0), "\"(\"")]);
        let options = FindOptions {
            regex: true,
            ..FindOptions::default()
        };
        assert_eq!(evaluator.find_next(key(0, 0, 0), "(", &options), None);
        assert_eq!(evaluator.find_next(key(0, 0, 0), r"\(", &options), Some(key(0, 0, 0)));
    }
}
