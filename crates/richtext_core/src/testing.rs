//! Recording fakes for exercising plugins without a real editing surface
//!
//! Enabled in this crate's own tests and, for downstream crates, through the
//! `testing` feature.

use crate::command::{Command, CommandExecutor};
use crate::context::{CompositionTracker, EditorContext};
use crate::error::CommandError;
use crate::event::{EventBus, Phase, Subscription};
use crate::logging::{DispatchLogger, LogLevel, LogRecord};
use crate::manager::{ManagerConfig, PluginManager};
use crate::payload::{StyleChange, STYLE_CHANGED};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// How [`RecordingCommands`] answers `execute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBehavior {
    Succeed,
    /// Report `Ok(false)`
    Decline,
    /// Report an adapter error
    Fail(CommandError),
}

/// Command adapter that records every call
#[derive(Debug)]
pub struct RecordingCommands {
    calls: Mutex<Vec<Command>>,
    behavior: Mutex<CommandBehavior>,
    states: Mutex<HashMap<String, bool>>,
    content: Mutex<String>,
}

impl Default for RecordingCommands {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behavior: Mutex::new(CommandBehavior::Succeed),
            states: Mutex::new(HashMap::new()),
            content: Mutex::new(String::new()),
        }
    }
}

impl RecordingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, behavior: CommandBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn set_state(&self, command: &str, active: bool) {
        lock(&self.states).insert(command.to_string(), active);
    }

    pub fn calls(&self) -> Vec<Command> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn last_call(&self) -> Option<Command> {
        lock(&self.calls).last().cloned()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }
}

impl CommandExecutor for RecordingCommands {
    fn execute(&self, command: &Command) -> Result<bool, CommandError> {
        lock(&self.calls).push(command.clone());
        match &*lock(&self.behavior) {
            CommandBehavior::Succeed => Ok(true),
            CommandBehavior::Decline => Ok(false),
            CommandBehavior::Fail(e) => Err(e.clone()),
        }
    }

    fn query_state(&self, command: &str) -> Option<bool> {
        lock(&self.states).get(command).copied()
    }

    fn content(&self) -> String {
        lock(&self.content).clone()
    }

    fn set_content(&self, content: &str) -> Result<(), CommandError> {
        *lock(&self.content) = content.to_string();
        Ok(())
    }
}

/// Owned copy of a [`LogRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLog {
    pub level: LogLevel,
    pub source: String,
    pub event: Option<String>,
    pub message: String,
}

/// Logger that keeps every record in memory
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<RecordedLog>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RecordedLog> {
        lock(&self.records).clone()
    }

    /// Whether any record at `level` mentions `needle`
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        lock(&self.records)
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    pub fn count(&self, level: LogLevel) -> usize {
        lock(&self.records).iter().filter(|r| r.level == level).count()
    }
}

impl DispatchLogger for RecordingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        lock(&self.records).push(RecordedLog {
            level: record.level,
            source: record.source.to_string(),
            event: record.event.map(str::to_string),
            message: record.message.to_string(),
        });
    }
}

/// Manager wired to recording fakes
pub struct TestHarness {
    pub manager: PluginManager,
    pub selection: Arc<CompositionTracker>,
    pub commands: Arc<RecordingCommands>,
    pub logger: Arc<RecordingLogger>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let selection = Arc::new(CompositionTracker::new());
        let commands = Arc::new(RecordingCommands::new());
        let logger = Arc::new(RecordingLogger::new());

        let bus = EventBus::with_logger(logger.clone());
        let editor = Arc::new(EditorContext::new(selection.clone(), commands.clone()));
        let manager = PluginManager::new(bus, editor, config);

        Self {
            manager,
            selection,
            commands,
            logger,
        }
    }

    /// Record every [`STYLE_CHANGED`] notification through an `on` listener
    pub fn style_changes(&self) -> StyleChangeRecorder {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = self
            .manager
            .bus()
            .on(STYLE_CHANGED, Phase::On, move |_, payload| {
                if let Some(change) = StyleChange::from_payload(payload) {
                    lock(&sink).push(change);
                }
                Ok(true)
            })
            .ok();
        StyleChangeRecorder { seen, _subscription: subscription }
    }
}

/// Collected [`StyleChange`]s; see [`TestHarness::style_changes`]
pub struct StyleChangeRecorder {
    seen: Arc<Mutex<Vec<StyleChange>>>,
    _subscription: Option<Subscription>,
}

impl StyleChangeRecorder {
    pub fn all(&self) -> Vec<StyleChange> {
        lock(&self.seen).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.seen).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.seen).is_empty()
    }
}
