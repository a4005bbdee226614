//! Command execution adapter: the seam between plugins and the editing surface
//!
//! The core never mutates a document itself. `on` handlers hand a [`Command`]
//! to whatever [`CommandExecutor`] the host wired into the
//! [`EditorContext`](crate::context::EditorContext).

use crate::error::CommandError;
use compact_str::CompactString;
use std::fmt;

/// A formatting mutation to apply to the current selection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    /// Surface command identifier (e.g. `backColor`, `superscript`)
    pub name: CompactString,
    /// Whether the surface should show its own UI for the command
    pub show_ui: bool,
    /// Optional argument (colour, font name, size)
    pub value: Option<String>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            name: CompactString::new(name),
            show_ui: false,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_show_ui(mut self, show_ui: bool) -> Self {
        self.show_ui = show_ui;
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}({}, {})", self.name, self.show_ui, value),
            None => write!(f, "{}({})", self.name, self.show_ui),
        }
    }
}

/// Capability to mutate the editing surface
pub trait CommandExecutor: Send + Sync {
    /// Apply `command` to the current selection.
    ///
    /// `Ok(false)` means the surface declined; callers treat it exactly like an error.
    fn execute(&self, command: &Command) -> Result<bool, CommandError>;

    /// Whether a toggle command is currently active at the selection, if known
    fn query_state(&self, _command: &str) -> Option<bool> {
        None
    }

    fn content(&self) -> String;

    fn set_content(&self, content: &str) -> Result<(), CommandError>;
}
