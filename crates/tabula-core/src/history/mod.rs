//! Undo/redo.
//!
//! Every change to a sheet that should be undoable is a [`Command`]. The
//! [`History`] applies commands, keeps them on the undo stack and merges
//! consecutive commands that belong together (typing into a cell, dragging
//! a row border).

mod commands;

pub use commands::{
    DeleteCommand, FreezeCommand, InsertCommand, ResizeCommand, ResizeGridCommand,
    SetAttributeCommand, SetCodeCommand, ThawCommand,
};

use std::any::Any;

use crate::error::{Result, TabulaError};
use crate::sheet::Sheet;

pub type CommandBox = Box<dyn Command>;

/// An undoable change to a sheet.
pub trait Command: std::fmt::Debug + Send + Sync {
    /// Apply the change. On error the sheet must be left as it was.
    fn apply(&mut self, sheet: &mut Sheet) -> Result<()>;

    /// Undo a successful [`apply`](Command::apply).
    fn revert(&mut self, sheet: &mut Sheet) -> Result<()>;

    /// Short text for menus ("Undo Set code").
    fn description(&self) -> &str;

    /// Absorb `other`, applied right after `self`, so that both are undone
    /// together. Returns `false` when the commands do not belong together.
    fn merge(&mut self, _other: &dyn Command) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

pub struct History {
    undo_stack: Vec<CommandBox>,
    redo_stack: Vec<CommandBox>,
    max_size: usize,
}

impl History {
    pub fn new(max_size: usize) -> Self {
        History {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size: max_size.max(1),
        }
    }

    /// Apply `command` and put it on the undo stack. A failed command leaves
    /// the history untouched.
    pub fn push(&mut self, mut command: CommandBox, sheet: &mut Sheet) -> Result<()> {
        command.apply(sheet)?;
        self.record(command);
        Ok(())
    }

    /// Put an already applied `command` on the undo stack.
    pub fn record(&mut self, command: CommandBox) {
        self.redo_stack.clear();

        if let Some(last) = self.undo_stack.last_mut() {
            if last.merge(&*command) {
                tracing::debug!(command = command.description(), "merged into previous command");
                return;
            }
        }

        self.undo_stack.push(command);
        if self.undo_stack.len() > self.max_size {
            let excess = self.undo_stack.len() - self.max_size;
            self.undo_stack.drain(..excess);
        }
    }

    pub fn undo(&mut self, sheet: &mut Sheet) -> Result<()> {
        let mut command = self.undo_stack.pop().ok_or(TabulaError::NothingToUndo)?;
        if let Err(err) = command.revert(sheet) {
            self.undo_stack.push(command);
            return Err(err);
        }
        tracing::debug!(command = command.description(), "undo");
        self.redo_stack.push(command);
        Ok(())
    }

    pub fn redo(&mut self, sheet: &mut Sheet) -> Result<()> {
        let mut command = self.redo_stack.pop().ok_or(TabulaError::NothingToRedo)?;
        if let Err(err) = command.apply(sheet) {
            self.redo_stack.push(command);
            return Err(err);
        }
        tracing::debug!(command = command.description(), "redo");
        self.undo_stack.push(command);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|command| command.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|command| command.description())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("undo_count", &self.undo_stack.len())
            .field("redo_count", &self.redo_stack.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}
