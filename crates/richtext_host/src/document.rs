//! In-memory editing surface backing the host session

use richtext_core::{Command, CommandError, CommandExecutor};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const TOGGLE_COMMANDS: &[&str] = &[
    "bold",
    "italic",
    "underline",
    "strikeThrough",
    "superscript",
    "subscript",
];

const VALUE_COMMANDS: &[&str] = &["backColor", "foreColor", "fontName", "fontSize"];

/// Style state applied at the current selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedStyles {
    pub toggles: BTreeMap<String, bool>,
    pub values: BTreeMap<String, String>,
}

impl AppliedStyles {
    pub fn is_empty(&self) -> bool {
        !self.toggles.values().any(|on| *on) && self.values.is_empty()
    }
}

#[derive(Debug, Default)]
struct DocumentState {
    content: String,
    styles: AppliedStyles,
    history: Vec<Command>,
}

/// Stand-in for a real editing surface: tracks content and the styles commands applied
#[derive(Debug, Default)]
pub struct InMemoryDocument {
    state: Mutex<DocumentState>,
}

impl InMemoryDocument {
    pub fn new(content: &str) -> Self {
        Self {
            state: Mutex::new(DocumentState {
                content: content.to_string(),
                ..DocumentState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn styles(&self) -> AppliedStyles {
        self.state().styles.clone()
    }

    /// Every command applied so far
    pub fn history(&self) -> Vec<Command> {
        self.state().history.clone()
    }
}

impl CommandExecutor for InMemoryDocument {
    fn execute(&self, command: &Command) -> Result<bool, CommandError> {
        let name = command.name.as_str();
        let mut state = self.state();

        if TOGGLE_COMMANDS.contains(&name) {
            let active = state.styles.toggles.entry(name.to_string()).or_insert(false);
            *active = !*active;
            // superscript and subscript exclude each other
            let other = match name {
                "superscript" => Some("subscript"),
                "subscript" => Some("superscript"),
                _ => None,
            };
            if let Some(other) = other {
                state.styles.toggles.insert(other.to_string(), false);
            }
        } else if VALUE_COMMANDS.contains(&name) {
            let Some(value) = command.value.as_ref().filter(|v| !v.is_empty()) else {
                return Err(CommandError::Rejected {
                    command: name.to_string(),
                    reason: "a value is required".to_string(),
                });
            };
            state.styles.values.insert(name.to_string(), value.clone());
        } else if name == "removeFormat" {
            state.styles = AppliedStyles::default();
        } else {
            return Err(CommandError::Unsupported(name.to_string()));
        }

        debug!("📝 Applied {}", command);
        state.history.push(command.clone());
        Ok(true)
    }

    fn query_state(&self, command: &str) -> Option<bool> {
        if TOGGLE_COMMANDS.contains(&command) {
            Some(self.state().styles.toggles.get(command).copied().unwrap_or(false))
        } else {
            None
        }
    }

    fn content(&self) -> String {
        self.state().content.clone()
    }

    fn set_content(&self, content: &str) -> Result<(), CommandError> {
        self.state().content = content.to_string();
        Ok(())
    }
}
