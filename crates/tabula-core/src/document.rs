//! A sheet together with its undo history.

use crate::error::Result;
use crate::eval::MacroOutput;
use crate::history::{CommandBox, History, SetCodeCommand};
use crate::settings::Settings;
use crate::sheet::{GridSnapshot, Sheet};
use tabula_engine::CellKey;

pub struct Document {
    sheet: Sheet,
    history: History,
}

impl Document {
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self::from_sheet(Sheet::new(settings)?))
    }

    pub fn from_sheet(sheet: Sheet) -> Self {
        let history = History::new(sheet.settings().max_undo);
        Document { sheet, history }
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    /// Direct access to the sheet. Changes made here are not undoable.
    pub fn sheet_mut(&mut self) -> &mut Sheet {
        &mut self.sheet
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Apply `command` and make it undoable.
    pub fn push(&mut self, command: CommandBox) -> Result<()> {
        self.history.push(command, &mut self.sheet)
    }

    pub fn undo(&mut self) -> Result<()> {
        self.history.undo(&mut self.sheet)
    }

    pub fn redo(&mut self) -> Result<()> {
        self.history.redo(&mut self.sheet)
    }

    /// Undoable [`Sheet::set_code`].
    pub fn set_code(&mut self, key: CellKey, code: Option<&str>) -> Result<()> {
        self.push(Box::new(SetCodeCommand::single(key, code)))
    }

    /// Run the macros. Cells they change form one undo step.
    pub fn execute_macros(&mut self) -> MacroOutput {
        let output = self.sheet.execute_macros();
        if !output.modifications.is_empty() {
            self.history.record(Box::new(SetCodeCommand::from_changes(
                "Run macros",
                output.modifications.clone(),
            )));
        }
        output
    }

    /// Replace the sheet contents. History is cleared.
    pub fn load_snapshot(&mut self, snapshot: GridSnapshot) -> Result<()> {
        self.sheet.load_snapshot(snapshot)?;
        self.history.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{DeleteCommand, InsertCommand};
    use tabula_engine::Shape;

    fn document() -> Document {
        Document::from_sheet(Sheet::with_shape(Shape::new(10, 10, 1), Settings::default()).unwrap())
    }

    fn key(row: usize, column: usize) -> CellKey {
        CellKey::new(row, column, 0)
    }

    #[test]
    fn test_macro_changes_undo_together() {
        let mut doc = document();
        doc.set_code(key(0, 0), Some("1")).unwrap();
        doc.sheet_mut()
            .set_macros("SET_CODE(0, 0, 0, \"2\");\nSET_CODE(1, 0, 0, 3);\nCLEAR_CODE(0, 0, 0);");

        let output = doc.execute_macros();
        assert_eq!(output.errors, "");
        assert_eq!(doc.sheet().get_code(key(0, 0)), None);
        assert_eq!(doc.sheet().get_code(key(1, 0)).as_deref(), Some("3"));
        assert_eq!(doc.history().undo_description(), Some("Run macros"));

        doc.undo().unwrap();
        assert_eq!(doc.sheet().get_code(key(0, 0)).as_deref(), Some("1"));
        assert_eq!(doc.sheet().get_code(key(1, 0)), None);

        doc.redo().unwrap();
        assert_eq!(doc.sheet().get_code(key(0, 0)), None);
        assert_eq!(doc.sheet().get_code(key(1, 0)).as_deref(), Some("3"));
    }

    #[test]
    fn test_structure_undo() {
        let mut doc = document();
        doc.set_code(key(4, 0), Some("\"x\"")).unwrap();
        doc.push(Box::new(InsertCommand::rows(0, 2, None))).unwrap();
        doc.push(Box::new(DeleteCommand::columns(0, 1, None))).unwrap();
        assert_eq!(doc.sheet().get_code(key(6, 0)), None);

        doc.undo().unwrap();
        assert_eq!(doc.sheet().get_code(key(6, 0)).as_deref(), Some("\"x\""));
        doc.undo().unwrap();
        assert_eq!(doc.sheet().get_code(key(4, 0)).as_deref(), Some("\"x\""));
    }

    #[test]
    fn test_load_clears_history() {
        let mut doc = document();
        doc.set_code(key(0, 0), Some("1")).unwrap();
        let snapshot = doc.sheet().snapshot();
        doc.load_snapshot(snapshot).unwrap();
        assert!(!doc.history().can_undo());
        assert_eq!(doc.sheet().display_value(key(0, 0)), "1");
    }
}
