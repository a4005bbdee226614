//! Shared editor state and the per-invocation plugin context

use crate::command::{Command, CommandExecutor};
use crate::error::EventError;
use crate::event::{Dispatch, DispatchReport, EventName, Phase, WeakEventBus};
use crate::logging::DispatchLogger;
use crate::payload::{EventPayload, StyleChange, STYLE_CHANGED};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Selection range in the editing surface, in character offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionRange {
    pub anchor: usize,
    pub focus: usize,
}

impl SelectionRange {
    pub fn new(anchor: usize, focus: usize) -> Self {
        Self { anchor, focus }
    }

    pub fn caret(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.focus)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.focus)
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Focus before anchor
    pub fn is_backward(&self) -> bool {
        self.focus < self.anchor
    }
}

/// Read-only view of IME composition and selection.
///
/// Must answer synchronously and truthfully at the moment a `before` handler asks.
pub trait SelectionState: Send + Sync {
    fn is_composing(&self) -> bool;

    fn selection(&self) -> Option<SelectionRange>;
}

/// Stock [`SelectionState`] fed by the host's composition/selection events
#[derive(Debug, Default)]
pub struct CompositionTracker {
    composing: AtomicBool,
    selection: RwLock<Option<SelectionRange>>,
}

impl CompositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn composition_start(&self) {
        self.composing.store(true, Ordering::Release);
    }

    pub fn composition_end(&self) {
        self.composing.store(false, Ordering::Release);
    }

    pub fn set_selection(&self, range: SelectionRange) {
        let mut selection = self.selection.write().unwrap_or_else(|e| e.into_inner());
        *selection = Some(range);
    }

    pub fn clear_selection(&self) {
        let mut selection = self.selection.write().unwrap_or_else(|e| e.into_inner());
        *selection = None;
    }
}

impl SelectionState for CompositionTracker {
    fn is_composing(&self) -> bool {
        self.composing.load(Ordering::Acquire)
    }

    fn selection(&self) -> Option<SelectionRange> {
        *self.selection.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// State shared by every plugin: selection provider, command adapter, metadata
pub struct EditorContext {
    selection: Arc<dyn SelectionState>,
    commands: Arc<dyn CommandExecutor>,
    metadata: HashMap<String, String>,
}

impl EditorContext {
    pub fn new(selection: Arc<dyn SelectionState>, commands: Arc<dyn CommandExecutor>) -> Self {
        Self {
            selection,
            commands,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn selection_state(&self) -> &dyn SelectionState {
        self.selection.as_ref()
    }

    pub fn commands(&self) -> &dyn CommandExecutor {
        self.commands.as_ref()
    }

    pub fn get_metadata(&self, key: &str) -> Option<&String> {
        self.metadata.get(key)
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

/// Everything the manager hands a plugin handler for one invocation
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    pub dispatch: &'a Dispatch<'a>,
    pub editor: &'a EditorContext,
    pub bus: &'a WeakEventBus,
    pub logger: &'a dyn DispatchLogger,
}

/// Context passed to every plugin handler, typed by the plugin's options
pub struct PluginContext<'a, O> {
    plugin: &'a str,
    invocation: Invocation<'a>,
    options: &'a O,
}

impl<'a, O> PluginContext<'a, O> {
    pub fn new(plugin: &'a str, invocation: Invocation<'a>, options: &'a O) -> Self {
        Self {
            plugin,
            invocation,
            options,
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin
    }

    pub fn event(&self) -> &EventName {
        self.invocation.dispatch.event
    }

    pub fn phase(&self) -> Phase {
        self.invocation.dispatch.phase
    }

    pub fn dispatch_id(&self) -> Uuid {
        self.invocation.dispatch.id
    }

    /// Resolved options of this plugin instance
    pub fn options(&self) -> &O {
        self.options
    }

    pub fn editor(&self) -> &EditorContext {
        self.invocation.editor
    }

    pub fn is_composing(&self) -> bool {
        self.invocation.editor.selection_state().is_composing()
    }

    pub fn selection(&self) -> Option<SelectionRange> {
        self.invocation.editor.selection_state().selection()
    }

    pub fn commands(&self) -> &dyn CommandExecutor {
        self.invocation.editor.commands()
    }

    /// Run a command through the adapter.
    ///
    /// A declined command or adapter error is logged and surfaces as `Err`,
    /// so `on` handlers can simply `?` it.
    pub fn execute(&self, command: &Command) -> Result<(), EventError> {
        match self.commands().execute(command) {
            Ok(true) => {
                self.debug(&format!("executed {}", command));
                Ok(())
            }
            Ok(false) => {
                let msg = format!("command {} was not applied", command);
                self.error(&msg);
                Err(EventError::HandlerExecutionFailed(msg))
            }
            Err(e) => {
                self.error(&format!("command {} failed: {}", command, e));
                Err(EventError::CommandFailed(e))
            }
        }
    }

    /// Emit another event through the same bus
    pub fn emit(
        &self,
        event: impl Into<EventName>,
        payload: impl Into<EventPayload>,
    ) -> Option<DispatchReport> {
        self.invocation.bus.emit(event, payload)
    }

    /// Emit the standard [`STYLE_CHANGED`] notification
    pub fn notify_style_change(&self, style: &str, value: Option<Value>) -> Option<DispatchReport> {
        self.emit(STYLE_CHANGED, StyleChange::new(style, value).to_payload())
    }

    /// Decline the action: logs `reason` at warning level and returns `Ok(false)`
    pub fn veto(&self, reason: &str) -> Result<bool, EventError> {
        self.warn(reason);
        Ok(false)
    }

    pub fn debug(&self, message: &str) {
        self.invocation.logger.debug(self.plugin, Some(self.event().as_str()), message);
    }

    pub fn info(&self, message: &str) {
        self.invocation.logger.info(self.plugin, Some(self.event().as_str()), message);
    }

    pub fn warn(&self, message: &str) {
        self.invocation.logger.warn(self.plugin, Some(self.event().as_str()), message);
    }

    pub fn error(&self, message: &str) {
        self.invocation.logger.error(self.plugin, Some(self.event().as_str()), message);
    }
}
