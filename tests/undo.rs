//! Undo and redo through a `Document`.

use tabula::{
    CellKey, Color, DeleteCommand, Document, InsertCommand, MergeArea, ResizeCommand,
    SetAttributeCommand, SetCodeCommand, Settings, Shape, Sheet, TabulaError,
};

fn document() -> Document {
    let sheet = Sheet::with_shape(Shape::new(10, 10, 2), Settings::default()).unwrap();
    Document::from_sheet(sheet)
}

fn key(row: usize, column: usize, table: usize) -> CellKey {
    CellKey::new(row, column, table)
}

#[test]
fn test_merged_edits_undo_in_one_step() {
    let mut doc = document();
    let k = key(0, 0, 0);
    let edit = |code: &str| SetCodeCommand::new("Edit cell", vec![(k, Some(code.to_string()))]);

    doc.push(Box::new(edit("a"))).unwrap();
    doc.push(Box::new(edit("b"))).unwrap();
    assert_eq!(doc.history().undo_count(), 1);
    assert_eq!(doc.sheet().get_code(k).as_deref(), Some("b"));

    doc.undo().unwrap();
    assert_eq!(doc.sheet().get_code(k), None);

    doc.redo().unwrap();
    assert_eq!(doc.sheet().get_code(k).as_deref(), Some("b"));
}

#[test]
fn test_undo_restores_values() {
    let mut doc = document();
    doc.set_code(key(0, 0, 0), Some("10")).unwrap();
    doc.set_code(key(1, 0, 0), Some("S(0, 0, 0) * 2")).unwrap();
    doc.set_code(key(0, 0, 0), Some("50")).unwrap();
    assert_eq!(doc.sheet().display_value(key(1, 0, 0)), "100");

    doc.undo().unwrap();
    assert_eq!(doc.sheet().display_value(key(1, 0, 0)), "20");
}

#[test]
fn test_empty_history_errors() {
    let mut doc = document();
    assert!(matches!(doc.undo(), Err(TabulaError::NothingToUndo)));
    assert!(matches!(doc.redo(), Err(TabulaError::NothingToRedo)));
}

#[test]
fn test_new_command_clears_redo() {
    let mut doc = document();
    doc.set_code(key(0, 0, 0), Some("1")).unwrap();
    doc.set_code(key(0, 1, 0), Some("2")).unwrap();
    doc.undo().unwrap();
    assert!(doc.history().can_redo());

    doc.set_code(key(0, 2, 0), Some("3")).unwrap();
    assert!(!doc.history().can_redo());
}

#[test]
fn test_delete_rows_undo_restores_formats_and_sizes() {
    let mut doc = document();
    doc.set_code(key(3, 3, 0), Some("\"kept\"")).unwrap();
    doc.push(Box::new(SetAttributeCommand::merge_cells(MergeArea::new(3, 3, 4, 4), 0)))
        .unwrap();
    doc.push(Box::new(ResizeCommand::rows(vec![3], 0, Some(40.0)))).unwrap();

    doc.push(Box::new(DeleteCommand::rows(2, 3, Some(0)))).unwrap();
    assert_eq!(doc.sheet().get_code(key(3, 3, 0)), None);

    doc.undo().unwrap();
    assert_eq!(doc.sheet().get_code(key(3, 3, 0)).as_deref(), Some("\"kept\""));
    assert_eq!(doc.sheet().row_height(3, 0), Some(40.0));
    assert_eq!(doc.sheet().merging_cell(key(4, 4, 0)), Some(key(3, 3, 0)));
}

#[test]
fn test_insert_tables_undo() {
    let mut doc = document();
    doc.set_code(key(0, 0, 1), Some("1")).unwrap();
    doc.push(Box::new(InsertCommand::tables(0, 2))).unwrap();
    assert_eq!(doc.sheet().shape(), Shape::new(10, 10, 4));
    assert_eq!(doc.sheet().get_code(key(0, 0, 3)).as_deref(), Some("1"));

    doc.undo().unwrap();
    assert_eq!(doc.sheet().shape(), Shape::new(10, 10, 2));
    assert_eq!(doc.sheet().get_code(key(0, 0, 1)).as_deref(), Some("1"));
}

#[test]
fn test_attribute_undo() {
    let mut doc = document();
    let red = Color::rgb(200, 0, 0);
    let diff = tabula::AttributeDiff::default()
        .with(tabula::AttributeName::Bgcolor, red)
        .unwrap();
    doc.push(Box::new(SetAttributeCommand::new(
        tabula::Selection::single(1, 1),
        0,
        diff,
    )))
    .unwrap();
    assert_eq!(doc.sheet().effective_attributes(key(1, 1, 0)).bgcolor, Some(red));

    doc.undo().unwrap();
    assert_eq!(doc.sheet().effective_attributes(key(1, 1, 0)).bgcolor, None);
    assert!(doc.sheet().attributes().is_empty());
}
